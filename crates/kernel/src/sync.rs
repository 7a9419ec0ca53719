//! Copies simulation poses onto the scene, blending between the pose before
//! the last sub-step and the current one.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use rapier3d::prelude::RigidBodyHandle;
use rigidsync_common::{DrivenNode, SceneTarget};

use crate::convert::{na_to_quat, na_to_vec3};
use crate::registry::{Registry, RigidBodyState};
use crate::world::PhysicsWorld;

/// A body's world-space pose captured before a sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySnapshot {
    pub position: Vec3,
    pub rotation: Quat,
}

pub type SnapshotMap = HashMap<RigidBodyHandle, BodySnapshot>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub written: usize,
    pub sleeping: usize,
    pub stale: usize,
    pub sleep_edges: usize,
}

/// Pose in the driven node's local frame.
fn local_matrix(state: &RigidBodyState, position: Vec3, rotation: Quat) -> Mat4 {
    state.inverse_world * Mat4::from_scale_rotation_translation(state.scale, rotation, position)
}

/// Write every registered body's pose to the scene and fire sleep/wake edges.
///
/// `alpha` is clamped to `[0, 1]`. Bodies the world no longer knows are
/// skipped for this call.
pub fn sync_transforms(
    world: &PhysicsWorld,
    registry: &mut Registry,
    previous: &SnapshotMap,
    alpha: f32,
    scene: &mut dyn SceneTarget,
) -> SyncStats {
    let alpha = alpha.clamp(0.0, 1.0);
    let mut stats = SyncStats::default();
    let Registry {
        bodies,
        body_events,
        ..
    } = registry;

    for (&handle, state) in bodies.iter_mut() {
        let Some(body) = world.rigid_body(handle) else {
            tracing::debug!(?handle, "skipping stale rigid body");
            stats.stale += 1;
            continue;
        };

        let sleeping = body.is_sleeping();
        if sleeping != state.is_sleeping {
            state.is_sleeping = sleeping;
            stats.sleep_edges += 1;
            if let Some(events) = body_events.get_mut(&handle) {
                if sleeping {
                    events.fire_sleep();
                } else {
                    events.fire_wake();
                }
            }
        }

        if sleeping && !state.node.is_instance_slot() {
            stats.sleeping += 1;
            continue;
        }

        let current = local_matrix(state, na_to_vec3(body.translation()), na_to_quat(body.rotation()));

        match state.node {
            DrivenNode::InstanceSlot { mesh, index } => {
                scene.set_instance_matrix(mesh, index, current);
            }
            DrivenNode::Single(node) => {
                let start = match previous.get(&handle) {
                    Some(snap) => {
                        let (_, rotation, position) =
                            local_matrix(state, snap.position, snap.rotation).to_scale_rotation_translation();
                        Some((position, rotation))
                    }
                    None => scene.local_pose(node),
                };
                let Some((start_pos, start_rot)) = start else {
                    tracing::debug!(?node, "skipping body whose scene node is gone");
                    stats.stale += 1;
                    continue;
                };
                let (_, rotation, position) = current.to_scale_rotation_translation();
                scene.set_local_pose(
                    node,
                    start_pos.lerp(position, alpha),
                    start_rot.slerp(rotation, alpha),
                );
            }
        }
        stats.written += 1;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::vec3_to_na;
    use crate::registry::EventCallbacks;
    use rapier3d::prelude::*;
    use rigidsync_common::{NodeId, Transform};
    use rigidsync_scene::SceneGraph;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Fixture {
        world: PhysicsWorld,
        registry: Registry,
        scene: SceneGraph,
        body: RigidBodyHandle,
        node: NodeId,
    }

    fn fixture(at: Vec3) -> Fixture {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let mut scene = SceneGraph::new();
        let node = scene.add_node("body", None, Transform::default()).unwrap();
        let body = world.insert_rigid_body(
            RigidBodyBuilder::dynamic().translation(vec3_to_na(at)),
        );
        let mut registry = Registry::new();
        registry.insert_rigid_body(
            body,
            RigidBodyState {
                node: DrivenNode::Single(node),
                inverse_world: Mat4::IDENTITY,
                scale: Vec3::ONE,
                is_sleeping: false,
            },
        );
        Fixture {
            world,
            registry,
            scene,
            body,
            node,
        }
    }

    fn snapshot(handle: RigidBodyHandle, position: Vec3, rotation: Quat) -> SnapshotMap {
        HashMap::from([(handle, BodySnapshot { position, rotation })])
    }

    #[test]
    fn alpha_zero_lands_on_previous_pose() {
        let mut f = fixture(Vec3::new(0.0, 5.0, 0.0));
        let prev_rot = Quat::from_rotation_y(0.5);
        let previous = snapshot(f.body, Vec3::new(0.0, 6.0, 0.0), prev_rot);

        sync_transforms(&f.world, &mut f.registry, &previous, 0.0, &mut f.scene);

        let (pos, rot) = f.scene.local_pose(f.node).unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(0.0, 6.0, 0.0), 1e-5));
        assert!(rot.abs_diff_eq(prev_rot, 1e-5));
    }

    #[test]
    fn alpha_one_lands_on_current_pose() {
        let mut f = fixture(Vec3::new(0.0, 5.0, 0.0));
        let previous = snapshot(f.body, Vec3::new(0.0, 6.0, 0.0), Quat::from_rotation_y(0.5));

        sync_transforms(&f.world, &mut f.registry, &previous, 1.0, &mut f.scene);

        let (pos, rot) = f.scene.local_pose(f.node).unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-5));
        assert!(rot.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn half_alpha_blends_from_previous() {
        let mut f = fixture(Vec3::new(0.0, 4.0, 0.0));
        let previous = snapshot(f.body, Vec3::new(0.0, 6.0, 0.0), Quat::IDENTITY);
        sync_transforms(&f.world, &mut f.registry, &previous, 0.5, &mut f.scene);
        let (pos, _) = f.scene.local_pose(f.node).unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-5));
    }

    #[test]
    fn without_snapshot_blends_from_node_pose() {
        let mut f = fixture(Vec3::new(0.0, 4.0, 0.0));
        // node starts at the origin
        sync_transforms(&f.world, &mut f.registry, &SnapshotMap::new(), 0.25, &mut f.scene);
        let (pos, _) = f.scene.local_pose(f.node).unwrap();
        assert!(pos.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn nested_node_receives_local_pose() {
        let mut f = fixture(Vec3::new(3.0, 1.0, 0.0));
        let parent = f
            .scene
            .add_node("parent", None, Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let child = f.scene.add_node("child", Some(parent), Transform::default()).unwrap();
        let parent_world = f.scene.node_world_matrix(parent).unwrap();
        f.registry.insert_rigid_body(
            f.body,
            RigidBodyState {
                node: DrivenNode::Single(child),
                inverse_world: parent_world.inverse(),
                scale: Vec3::ONE,
                is_sleeping: false,
            },
        );

        sync_transforms(&f.world, &mut f.registry, &SnapshotMap::new(), 1.0, &mut f.scene);

        let (local, _) = f.scene.local_pose(child).unwrap();
        assert!(local.abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-5));
        let world = f.scene.world_position(child).unwrap();
        assert!(world.abs_diff_eq(Vec3::new(3.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn instance_slot_gets_unblended_matrix() {
        let mut f = fixture(Vec3::new(2.0, 0.0, 0.0));
        let mesh = f
            .scene
            .add_instanced_mesh("crates", None, Transform::default(), 3)
            .unwrap();
        f.registry.insert_rigid_body(
            f.body,
            RigidBodyState {
                node: DrivenNode::InstanceSlot { mesh, index: 1 },
                inverse_world: Mat4::IDENTITY,
                scale: Vec3::splat(2.0),
                is_sleeping: false,
            },
        );
        let previous = snapshot(f.body, Vec3::ZERO, Quat::IDENTITY);

        sync_transforms(&f.world, &mut f.registry, &previous, 0.0, &mut f.scene);

        let m = f.scene.instance_matrix(mesh, 1).unwrap();
        let (scale, _, translation) = m.to_scale_rotation_translation();
        assert!(translation.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
        assert!(scale.abs_diff_eq(Vec3::splat(2.0), 1e-5));
    }

    #[test]
    fn sleeping_plain_body_is_not_written() {
        let mut f = fixture(Vec3::new(0.0, 7.0, 0.0));
        f.world.rigid_body_mut(f.body).unwrap().sleep();
        let stats = sync_transforms(&f.world, &mut f.registry, &SnapshotMap::new(), 1.0, &mut f.scene);
        assert_eq!(stats.sleeping, 1);
        assert_eq!(stats.written, 0);
        let (pos, _) = f.scene.local_pose(f.node).unwrap();
        assert_eq!(pos, Vec3::ZERO);
    }

    #[test]
    fn sleep_edge_fires_once_across_repeated_syncs() {
        let mut f = fixture(Vec3::ZERO);
        let sleeps = Rc::new(Cell::new(0));
        let wakes = Rc::new(Cell::new(0));
        let (s, w) = (Rc::clone(&sleeps), Rc::clone(&wakes));
        f.registry.subscribe_rigid_body(
            f.body,
            EventCallbacks::new()
                .on_sleep(move || s.set(s.get() + 1))
                .on_wake(move || w.set(w.get() + 1)),
        );

        f.world.rigid_body_mut(f.body).unwrap().sleep();
        for _ in 0..2 {
            sync_transforms(&f.world, &mut f.registry, &SnapshotMap::new(), 1.0, &mut f.scene);
        }
        assert_eq!((sleeps.get(), wakes.get()), (1, 0));

        f.world.rigid_body_mut(f.body).unwrap().wake_up(true);
        for _ in 0..2 {
            sync_transforms(&f.world, &mut f.registry, &SnapshotMap::new(), 1.0, &mut f.scene);
        }
        assert_eq!((sleeps.get(), wakes.get()), (1, 1));
    }

    #[test]
    fn stale_body_is_skipped() {
        let mut f = fixture(Vec3::ZERO);
        f.world.remove_rigid_body(f.body);
        let stats = sync_transforms(&f.world, &mut f.registry, &SnapshotMap::new(), 1.0, &mut f.scene);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.written, 0);
    }
}
