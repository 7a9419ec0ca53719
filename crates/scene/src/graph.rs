use glam::{Mat4, Quat, Vec3};
use rigidsync_common::{DrivenNode, InstancedMeshId, NodeId, SceneTarget, Transform};

/// A node in the hierarchy.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub local: Transform,
}

/// A batch of per-instance matrices attached to a node of the hierarchy.
///
/// Instance matrices are expressed in the owning node's frame.
#[derive(Debug, Clone)]
pub struct InstancedMesh {
    pub node: NodeId,
    pub matrices: Vec<Mat4>,
    /// Set whenever an instance matrix is written; cleared by the consumer.
    pub needs_update: bool,
}

/// In-memory scene graph: a parent-linked node arena plus instanced meshes.
///
/// Parents always precede their children in the arena, so world matrices are
/// computed by walking up the parent chain without cycle checks.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    instanced: Vec<InstancedMesh>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (or at the root). Returns `None` if the parent does not exist.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        local: Transform,
    ) -> Option<NodeId> {
        if let Some(p) = parent {
            self.node(p)?;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SceneNode {
            name: name.into(),
            parent,
            local,
        });
        Some(id)
    }

    /// Add an instanced mesh with `count` identity instances. The mesh gets its own node.
    pub fn add_instanced_mesh(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        local: Transform,
        count: usize,
    ) -> Option<InstancedMeshId> {
        let node = self.add_node(name, parent, local)?;
        let id = InstancedMeshId(self.instanced.len() as u32);
        self.instanced.push(InstancedMesh {
            node,
            matrices: vec![Mat4::IDENTITY; count],
            needs_update: false,
        });
        Some(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn instanced_mesh(&self, id: InstancedMeshId) -> Option<&InstancedMesh> {
        self.instanced.get(id.0 as usize)
    }

    pub fn instanced_mesh_mut(&mut self, id: InstancedMeshId) -> Option<&mut InstancedMesh> {
        self.instanced.get_mut(id.0 as usize)
    }

    pub fn instance_matrix(&self, id: InstancedMeshId, index: usize) -> Option<Mat4> {
        self.instanced_mesh(id)?.matrices.get(index).copied()
    }

    /// Iterate nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Iterate instanced meshes in insertion order.
    pub fn instanced_meshes(&self) -> impl Iterator<Item = (InstancedMeshId, &InstancedMesh)> {
        self.instanced
            .iter()
            .enumerate()
            .map(|(i, m)| (InstancedMeshId(i as u32), m))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// World matrix of a node: product of local matrices from the root down.
    pub fn node_world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.node(id)?;
        let mut matrix = node.local.to_matrix();
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            matrix = node.local.to_matrix() * matrix;
        }
        Some(matrix)
    }

    /// World position of a node.
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.node_world_matrix(id)
            .map(|m| m.transform_point3(Vec3::ZERO))
    }
}

impl SceneTarget for SceneGraph {
    fn world_matrix(&self, node: DrivenNode) -> Option<Mat4> {
        match node {
            DrivenNode::Single(id) => self.node_world_matrix(id),
            DrivenNode::InstanceSlot { mesh, index } => {
                let owner = self.instanced_mesh(mesh)?;
                let instance = *owner.matrices.get(index)?;
                Some(self.node_world_matrix(owner.node)? * instance)
            }
        }
    }

    fn parent_world_matrix(&self, node: DrivenNode) -> Option<Mat4> {
        match node {
            DrivenNode::Single(id) => match self.node(id)?.parent {
                Some(parent) => self.node_world_matrix(parent),
                None => Some(Mat4::IDENTITY),
            },
            DrivenNode::InstanceSlot { mesh, index } => {
                let owner = self.instanced_mesh(mesh)?;
                owner.matrices.get(index)?;
                self.node_world_matrix(owner.node)
            }
        }
    }

    fn local_pose(&self, node: NodeId) -> Option<(Vec3, Quat)> {
        self.node(node)
            .map(|n| (n.local.position, n.local.rotation))
    }

    fn set_local_pose(&mut self, node: NodeId, position: Vec3, rotation: Quat) {
        match self.node_mut(node) {
            Some(n) => {
                n.local.position = position;
                n.local.rotation = rotation;
            }
            None => tracing::debug!(?node, "pose written to unknown node"),
        }
    }

    fn set_instance_matrix(&mut self, mesh: InstancedMeshId, index: usize, matrix: Mat4) {
        match self.instanced_mesh_mut(mesh) {
            Some(m) if index < m.matrices.len() => {
                m.matrices[index] = matrix;
                m.needs_update = true;
            }
            _ => tracing::debug!(?mesh, index, "matrix written to unknown instance slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_node_world_matrix_is_local() {
        let mut scene = SceneGraph::new();
        let id = scene
            .add_node("root", None, Transform::from_position(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        assert_eq!(scene.world_position(id), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(
            scene.parent_world_matrix(DrivenNode::Single(id)),
            Some(Mat4::IDENTITY)
        );
    }

    #[test]
    fn nested_world_matrix_composes_parents() {
        let mut scene = SceneGraph::new();
        let parent = scene
            .add_node(
                "parent",
                None,
                Transform {
                    position: Vec3::new(0.0, 5.0, 0.0),
                    scale: Vec3::splat(2.0),
                    ..Transform::default()
                },
            )
            .unwrap();
        let child = scene
            .add_node("child", Some(parent), Transform::from_position(Vec3::X))
            .unwrap();
        let p = scene.world_position(child).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(2.0, 5.0, 0.0), 1e-6));

        let parent_world = scene.parent_world_matrix(DrivenNode::Single(child)).unwrap();
        assert_eq!(Some(parent_world), scene.node_world_matrix(parent));
    }

    #[test]
    fn add_node_rejects_missing_parent() {
        let mut scene = SceneGraph::new();
        assert!(scene.add_node("orphan", Some(NodeId(9)), Transform::default()).is_none());
        assert_eq!(scene.node_count(), 0);
    }

    #[test]
    fn instance_slot_world_matrix_includes_instance() {
        let mut scene = SceneGraph::new();
        let mesh = scene
            .add_instanced_mesh("batch", None, Transform::from_position(Vec3::Y), 3)
            .unwrap();
        scene.set_instance_matrix(mesh, 2, Mat4::from_translation(Vec3::X));
        assert!(scene.instanced_mesh(mesh).unwrap().needs_update);

        let slot = DrivenNode::InstanceSlot { mesh, index: 2 };
        let world = scene.world_matrix(slot).unwrap();
        assert!(
            world
                .transform_point3(Vec3::ZERO)
                .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6)
        );
        assert_eq!(
            scene.parent_world_matrix(slot),
            Some(Mat4::from_translation(Vec3::Y))
        );
    }

    #[test]
    fn out_of_range_instance_slot_is_unknown() {
        let mut scene = SceneGraph::new();
        let mesh = scene
            .add_instanced_mesh("batch", None, Transform::default(), 1)
            .unwrap();
        let slot = DrivenNode::InstanceSlot { mesh, index: 5 };
        assert!(scene.world_matrix(slot).is_none());
        assert!(scene.parent_world_matrix(slot).is_none());
    }

    #[test]
    fn set_local_pose_keeps_scale() {
        let mut scene = SceneGraph::new();
        let id = scene
            .add_node(
                "scaled",
                None,
                Transform {
                    scale: Vec3::splat(3.0),
                    ..Transform::default()
                },
            )
            .unwrap();
        scene.set_local_pose(id, Vec3::Z, Quat::from_rotation_x(1.0));
        let node = scene.node(id).unwrap();
        assert_eq!(node.local.position, Vec3::Z);
        assert_eq!(node.local.scale, Vec3::splat(3.0));
    }
}
