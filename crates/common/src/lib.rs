//! Shared types for the rigidsync workspace.
//!
//! # Invariants
//! - Nothing here depends on the physics engine; scene and kernel crates meet on these types.

mod scene;
mod types;

pub use scene::SceneTarget;
pub use types::{DrivenNode, InstancedMeshId, NodeId, Transform};
