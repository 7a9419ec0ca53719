use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Index of a node in the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Index of an instanced mesh (a batch of per-instance matrices) in the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstancedMeshId(pub u32);

/// The scene object a rigid body drives.
///
/// Resolved once when the body is registered; transform sync matches on the
/// variant instead of inspecting the node every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrivenNode {
    /// A plain node: position and rotation are written, with interpolation.
    Single(NodeId),
    /// One slot of an instanced mesh: the local matrix is written directly.
    InstanceSlot { mesh: InstancedMeshId, index: usize },
}

impl DrivenNode {
    pub fn is_instance_slot(&self) -> bool {
        matches!(self, Self::InstanceSlot { .. })
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Compose into a scale-rotation-translation matrix.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Decompose an affine matrix. Shear is discarded.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}
