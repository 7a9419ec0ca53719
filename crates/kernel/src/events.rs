//! Event correlation: turns raw engine event pairs into self-relative payloads
//! and invokes the listeners registered on both sides of each contact.

use glam::Vec3;
use rapier3d::prelude::*;
use rigidsync_common::{DrivenNode, NodeId};

use crate::convert::na_to_vec3;
use crate::registry::{EventCallbacks, Registry};
use crate::world::PhysicsWorld;

/// One side of a contact, as seen by the listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionTarget {
    pub collider: ColliderHandle,
    pub collider_node: Option<NodeId>,
    pub collider_world_parent: Option<NodeId>,
    pub rigid_body: Option<RigidBodyHandle>,
    pub rigid_body_node: Option<DrivenNode>,
}

/// Payload for exit and intersection callbacks. `target` is always the side
/// the listener is registered on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPayload {
    pub target: CollisionTarget,
    pub other: CollisionTarget,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// World-space contact point.
    pub point: Vec3,
    /// Penetration is negative.
    pub dist: f32,
}

/// Contact details captured when a collision starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifoldInfo {
    /// World-space normal, pointing from the pair's first collider to its second.
    pub normal: Vec3,
    pub points: Vec<ContactPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionEnterPayload {
    pub target: CollisionTarget,
    pub other: CollisionTarget,
    pub manifold: ContactManifoldInfo,
    /// True when the engine stores the pair in the opposite order from the
    /// event, so `manifold.normal` points from the event's second collider.
    pub flipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactForcePayload {
    pub target: CollisionTarget,
    pub other: CollisionTarget,
    pub total_force: Vec3,
    pub total_force_magnitude: f32,
    pub max_force_direction: Vec3,
    pub max_force_magnitude: f32,
}

/// Number of listener invocations made while dispatching a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub invoked: usize,
    pub skipped: usize,
}

fn resolve(world: &PhysicsWorld, registry: &Registry, handle: ColliderHandle) -> Option<CollisionTarget> {
    let collider = world.collider(handle)?;
    let state = registry.collider(handle);
    let rigid_body = collider.parent();
    Some(CollisionTarget {
        collider: handle,
        collider_node: state.and_then(|s| s.node),
        collider_world_parent: state.and_then(|s| s.world_parent),
        rigid_body,
        rigid_body_node: rigid_body.and_then(|b| registry.rigid_body(b)).map(|s| s.node),
    })
}

fn manifold_info(world: &PhysicsWorld, a: ColliderHandle, b: ColliderHandle) -> Option<(ContactManifoldInfo, bool)> {
    let pair = world.contact_pair(a, b)?;
    let manifold = pair.manifolds.first()?;
    let points = manifold
        .data
        .solver_contacts
        .iter()
        .map(|c| ContactPoint {
            point: Vec3::new(c.point.x, c.point.y, c.point.z),
            dist: c.dist,
        })
        .collect();
    let info = ContactManifoldInfo {
        normal: na_to_vec3(&manifold.data.normal),
        points,
    };
    Some((info, pair.collider1 != a))
}

/// Listener slots for a pair, in dispatch order: body A, body B, collider A,
/// collider B. The flag says whether the slot belongs to side A.
fn for_each_slot(
    registry: &mut Registry,
    a: &CollisionTarget,
    b: &CollisionTarget,
    mut f: impl FnMut(&mut EventCallbacks, bool),
) {
    for (body, is_a) in [(a.rigid_body, true), (b.rigid_body, false)] {
        if let Some(events) = body.and_then(|h| registry.body_events.get_mut(&h)) {
            f(events, is_a);
        }
    }
    for (collider, is_a) in [(a.collider, true), (b.collider, false)] {
        if let Some(events) = registry.collider_events.get_mut(&collider) {
            f(events, is_a);
        }
    }
}

/// Dispatch a drained batch of collision events.
pub fn dispatch_collision_events(
    world: &PhysicsWorld,
    registry: &mut Registry,
    events: &[CollisionEvent],
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    for event in events {
        let (h1, h2) = (event.collider1(), event.collider2());
        let (Some(a), Some(b)) = (resolve(world, registry, h1), resolve(world, registry, h2)) else {
            tracing::debug!(?h1, ?h2, "dropping collision event for removed collider");
            stats.skipped += 1;
            continue;
        };
        let side_a = CollisionPayload { target: a, other: b };
        let side_b = CollisionPayload { target: b, other: a };
        let pick = |is_a: bool| if is_a { &side_a } else { &side_b };

        if event.started() {
            if let Some((manifold, flipped)) = manifold_info(world, h1, h2) {
                for_each_slot(registry, &a, &b, |events, is_a| {
                    let side = pick(is_a);
                    let payload = CollisionEnterPayload {
                        target: side.target,
                        other: side.other,
                        manifold: manifold.clone(),
                        flipped,
                    };
                    if events.fire_collision_enter(&payload) {
                        stats.invoked += 1;
                    }
                });
            }
            if event.sensor() && world.intersection_pair(h1, h2) {
                for_each_slot(registry, &a, &b, |events, is_a| {
                    if events.fire_intersection_enter(pick(is_a)) {
                        stats.invoked += 1;
                    }
                });
            }
        } else {
            for_each_slot(registry, &a, &b, |events, is_a| {
                let payload = pick(is_a);
                if events.fire_collision_exit(payload) {
                    stats.invoked += 1;
                }
                if events.fire_intersection_exit(payload) {
                    stats.invoked += 1;
                }
            });
        }
    }

    stats
}

/// Dispatch a drained batch of contact-force events. Both sides receive the
/// force exactly as the engine reports it.
pub fn dispatch_contact_force_events(
    world: &PhysicsWorld,
    registry: &mut Registry,
    events: &[ContactForceEvent],
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    for event in events {
        let (h1, h2) = (event.collider1, event.collider2);
        let (Some(a), Some(b)) = (resolve(world, registry, h1), resolve(world, registry, h2)) else {
            tracing::debug!(?h1, ?h2, "dropping contact force event for removed collider");
            stats.skipped += 1;
            continue;
        };
        for_each_slot(registry, &a, &b, |events, is_a| {
            let (target, other) = if is_a { (a, b) } else { (b, a) };
            let payload = ContactForcePayload {
                target,
                other,
                total_force: na_to_vec3(&event.total_force),
                total_force_magnitude: event.total_force_magnitude,
                max_force_direction: na_to_vec3(&event.max_force_direction),
                max_force_magnitude: event.max_force_magnitude,
            };
            if events.fire_contact_force(&payload) {
                stats.invoked += 1;
            }
        });
    }

    stats
}
