//! Scene adapter: an in-memory scene graph the stepper can drive.
//!
//! # Invariants
//! - The scene never reads physics state; it only receives poses through `SceneTarget`.
//! - Parents precede children, so world matrices are a straight walk up the chain.

mod graph;
mod renderer;

pub use graph::{InstancedMesh, SceneGraph, SceneNode};
pub use renderer::{DebugTextRenderer, Renderer};
