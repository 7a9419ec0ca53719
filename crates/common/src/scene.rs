use glam::{Mat4, Quat, Vec3};

use crate::{DrivenNode, InstancedMeshId, NodeId};

/// The stepper's view of a scene graph.
///
/// The physics side never owns scene objects. It reads world matrices once
/// at registration and writes poses back after every frame.
pub trait SceneTarget {
    /// World matrix of the driven object. For an instance slot this is the
    /// instanced mesh's world matrix times the slot's instance matrix.
    fn world_matrix(&self, node: DrivenNode) -> Option<Mat4>;

    /// World matrix of the frame the driven object's local transform lives in:
    /// the parent node for a plain node (identity at the root), the instanced
    /// mesh itself for an instance slot.
    fn parent_world_matrix(&self, node: DrivenNode) -> Option<Mat4>;

    /// Local position and rotation of a plain node.
    fn local_pose(&self, node: NodeId) -> Option<(Vec3, Quat)>;

    /// Overwrite the local position and rotation of a plain node. Scale is untouched.
    fn set_local_pose(&mut self, node: NodeId, position: Vec3, rotation: Quat);

    /// Overwrite one instance matrix of an instanced mesh.
    fn set_instance_matrix(&mut self, mesh: InstancedMeshId, index: usize, matrix: Mat4);
}
