//! Physics kernel: owns the simulation world, advances it from a host frame
//! loop, mirrors body poses onto a scene, and routes contact events to
//! per-body and per-collider listeners.
//!
//! # Invariants
//! - Exactly one live world per `Stepper`; config changes never rebuild it.
//! - Registry entries never outlive their handle's registration.
//! - Every listener sees itself as `target` and the opposite side as `other`.

pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod options;
pub mod registry;
pub mod stepper;
pub mod sync;
pub mod world;

pub use config::{ConfigDiff, ConfigField, PhysicsConfig, TimeStep};
pub use error::{ConfigError, StepperError};
pub use events::{
    CollisionEnterPayload, CollisionPayload, CollisionTarget, ContactForcePayload, ContactManifoldInfo,
    ContactPoint,
};
pub use options::{ColliderOptions, ColliderShape, RigidBodyOptions};
pub use registry::{ColliderState, EventCallbacks, Registry, RigidBodyState};
pub use stepper::{FrameOutcome, FrameReport, StepCallbackId, Stepper};
pub use sync::{BodySnapshot, SyncStats};
pub use world::{PhysicsWorld, WorldManager};

/// Re-exported so callers can name handles and body types without a direct
/// engine dependency.
pub use rapier3d;
