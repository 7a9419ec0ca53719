use std::fmt::Write;

use glam::Vec3;

use crate::SceneGraph;

/// Renderer-agnostic interface. All renderers implement this trait.
///
/// A renderer only reads the scene; poses are written by the stepper.
pub trait Renderer {
    /// The output type produced by this renderer.
    type Output;

    /// Render one frame from the given scene.
    fn render(&self, scene: &SceneGraph) -> Self::Output;
}

/// Debug text renderer.
///
/// Produces one line per node with its world position, and one line per
/// instance slot. Used by the CLI and in tests.
#[derive(Debug)]
pub struct DebugTextRenderer {
    /// Decimal places for printed coordinates.
    pub precision: usize,
}

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self { precision: 2 }
    }
}

impl Default for DebugTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, scene: &SceneGraph) -> String {
        let prec = self.precision;
        let mut out = String::new();
        let _ = writeln!(out, "=== Scene ({} nodes) ===", scene.node_count());

        for (id, node) in scene.nodes() {
            let p = scene.world_position(id).unwrap_or(Vec3::ZERO);
            let _ = writeln!(
                out,
                "  [{}] {} pos=({:.prec$}, {:.prec$}, {:.prec$})",
                id.0, node.name, p.x, p.y, p.z
            );
        }

        for (id, mesh) in scene.instanced_meshes() {
            let _ = writeln!(
                out,
                "  instanced #{} on node {} ({} slots)",
                id.0,
                mesh.node.0,
                mesh.matrices.len()
            );
            for (i, m) in mesh.matrices.iter().enumerate() {
                let p = m.transform_point3(Vec3::ZERO);
                let _ = writeln!(
                    out,
                    "    slot {i} pos=({:.prec$}, {:.prec$}, {:.prec$})",
                    p.x, p.y, p.z
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigidsync_common::Transform;

    #[test]
    fn debug_renderer_empty_scene() {
        let scene = SceneGraph::new();
        let output = DebugTextRenderer::new().render(&scene);
        assert!(output.contains("0 nodes"));
    }

    #[test]
    fn debug_renderer_lists_nodes_and_slots() {
        let mut scene = SceneGraph::new();
        scene
            .add_node("ball", None, Transform::from_position(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        scene
            .add_instanced_mesh("crates", None, Transform::default(), 2)
            .unwrap();

        let output = DebugTextRenderer::new().render(&scene);
        assert!(output.contains("ball pos=(1.00, 2.00, 3.00)"));
        assert!(output.contains("2 slots"));
        assert!(output.contains("slot 1"));
    }
}
