use std::path::PathBuf;

use glam::Vec3;
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};
use rigidsync_common::DrivenNode;

/// Errors from building or loading a `PhysicsConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("fixed time step must be finite and at least 1e-6 seconds, got {0}")]
    InvalidTimeStep(f32),
    #[error("gravity must be finite, got {0:?}")]
    NonFiniteGravity(Vec3),
    #[error("maxVelocityIterations must be at least 1")]
    ZeroVelocityIterations,
    #[error("prediction distance must be finite and non-negative, got {0}")]
    InvalidPredictionDistance(f32),
    #[error("erp must lie strictly between 0 and 1, got {0}")]
    InvalidErp(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized config format: {0}")]
    UnknownFormat(PathBuf),
}

/// Errors from the stepper's registration API.
#[derive(Debug, thiserror::Error)]
pub enum StepperError {
    #[error("physics engine is not ready")]
    NotReady,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("scene node {0:?} not found")]
    UnknownNode(DrivenNode),
    #[error("rigid body {0:?} is not registered")]
    UnknownRigidBody(RigidBodyHandle),
    #[error("collider {0:?} is not registered")]
    UnknownCollider(ColliderHandle),
}
