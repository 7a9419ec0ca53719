use glam::Quat;
use rapier3d::prelude::{ActiveEvents, ColliderHandle, RigidBodyHandle};
use rigidsync_common::{DrivenNode, NodeId, SceneTarget};

use crate::config::{PhysicsConfig, TimeStep};
use crate::convert::{na_to_quat, na_to_vec3};
use crate::error::StepperError;
use crate::events::{dispatch_collision_events, dispatch_contact_force_events};
use crate::options::{ColliderOptions, RigidBodyOptions};
use crate::registry::{ColliderState, EventCallbacks, Registry, RigidBodyState};
use crate::sync::{sync_transforms, BodySnapshot, SnapshotMap};
use crate::world::{PhysicsWorld, WorldManager};
use crate::ConfigDiff;

/// Longest frame delta the stepper will consume in one call, in seconds.
pub const MAX_FRAME_DELTA: f32 = 0.5;

/// Callback run immediately before or after every individual sub-step.
pub type StepCallback = Box<dyn FnMut(&mut PhysicsWorld)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepCallbackId(u64);

/// Accumulator and interpolation snapshots carried between frames.
#[derive(Debug, Default)]
pub struct SteppingState {
    pub previous: SnapshotMap,
    /// Unconsumed simulation time, in seconds.
    pub accumulator: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Stepped,
    Paused,
    NotReady,
}

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    pub substeps: u32,
    /// Interpolation factor used for the transform sync, in `[0, 1]`.
    pub alpha: f32,
    /// True while any dynamic or kinematic body is awake.
    pub needs_redraw: bool,
    pub collision_events: usize,
    pub contact_force_events: usize,
}

impl FrameReport {
    fn idle(outcome: FrameOutcome) -> Self {
        Self {
            outcome,
            substeps: 0,
            alpha: 1.0,
            needs_redraw: false,
            collision_events: 0,
            contact_force_events: 0,
        }
    }
}

fn clamp_delta(delta: f32) -> f32 {
    if delta.is_finite() {
        delta.clamp(0.0, MAX_FRAME_DELTA)
    } else {
        0.0
    }
}

/// Drives one physics world from a host frame loop.
///
/// Each frame: advance the world by zero or more sub-steps, write body poses
/// to the scene, then dispatch the events the sub-steps produced.
///
/// # Invariants
/// - With a fixed time step the accumulator is in `[0, step)` after every frame.
/// - Interpolation snapshots are taken before the sub-step that moves past them.
/// - Events are dispatched only after all of a frame's sub-steps have run.
pub struct Stepper {
    manager: WorldManager,
    registry: Registry,
    stepping: SteppingState,
    before_step: Vec<(StepCallbackId, StepCallback)>,
    after_step: Vec<(StepCallbackId, StepCallback)>,
    next_callback_id: u64,
    total_substeps: u64,
    last_report: Option<FrameReport>,
}

impl std::fmt::Debug for Stepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stepper")
            .field("manager", &self.manager)
            .field("registry", &self.registry)
            .field("accumulator", &self.stepping.accumulator)
            .field("before_step", &self.before_step.len())
            .field("after_step", &self.after_step.len())
            .field("total_substeps", &self.total_substeps)
            .finish()
    }
}

impl Stepper {
    pub fn new(config: PhysicsConfig) -> Result<Self, StepperError> {
        Ok(Self::with_manager(WorldManager::new(config)?))
    }

    /// A stepper whose engine is still initializing; see [`WorldManager::deferred`].
    pub fn deferred(config: PhysicsConfig) -> Result<Self, StepperError> {
        Ok(Self::with_manager(WorldManager::deferred(config)?))
    }

    fn with_manager(manager: WorldManager) -> Self {
        Self {
            manager,
            registry: Registry::new(),
            stepping: SteppingState::default(),
            before_step: Vec::new(),
            after_step: Vec::new(),
            next_callback_id: 0,
            total_substeps: 0,
            last_report: None,
        }
    }

    pub fn mark_ready(&mut self) {
        self.manager.mark_ready();
    }

    pub fn config(&self) -> &PhysicsConfig {
        self.manager.config()
    }

    /// Apply a new configuration. World fields are written in place.
    pub fn set_config(&mut self, config: PhysicsConfig) -> Result<ConfigDiff, StepperError> {
        let diff = self.manager.apply_config(config)?;
        let config = self.manager.config();
        if config.time_step.is_vary() {
            self.stepping.accumulator = 0.0;
        }
        if !config.interpolate {
            self.stepping.previous.clear();
        }
        Ok(diff)
    }

    pub fn set_paused(&mut self, paused: bool) -> Result<ConfigDiff, StepperError> {
        let config = PhysicsConfig {
            paused,
            ..self.manager.config().clone()
        };
        self.set_config(config)
    }

    pub fn world(&self) -> Option<&PhysicsWorld> {
        self.manager.peek()
    }

    /// Direct engine access. Builds the world if needed.
    pub fn world_mut(&mut self) -> Option<&mut PhysicsWorld> {
        self.manager.world()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn accumulator(&self) -> f64 {
        self.stepping.accumulator
    }

    pub fn total_substeps(&self) -> u64 {
        self.total_substeps
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Advance by one host frame. Does nothing while paused.
    pub fn on_frame(&mut self, delta: f32, scene: &mut dyn SceneTarget) -> FrameReport {
        if self.manager.config().paused {
            let report = FrameReport::idle(FrameOutcome::Paused);
            self.last_report = Some(report);
            return report;
        }
        self.step(delta, scene)
    }

    /// Advance by one host frame even when paused.
    pub fn step(&mut self, delta: f32, scene: &mut dyn SceneTarget) -> FrameReport {
        let _span = tracing::debug_span!("physics_frame").entered();
        let report = self.advance(delta, scene);
        self.total_substeps += u64::from(report.substeps);
        if report.substeps > 1 {
            tracing::debug!(substeps = report.substeps, alpha = report.alpha, "catch-up frame");
        } else {
            tracing::trace!(substeps = report.substeps, alpha = report.alpha, "frame");
        }
        self.last_report = Some(report);
        report
    }

    fn advance(&mut self, delta: f32, scene: &mut dyn SceneTarget) -> FrameReport {
        let time_step = self.manager.config().time_step;
        let interpolate = self.manager.config().interpolate;
        let Some(world) = self.manager.world() else {
            return FrameReport::idle(FrameOutcome::NotReady);
        };
        let delta = clamp_delta(delta);
        let mut substeps = 0u32;

        let alpha = match time_step {
            TimeStep::Vary => {
                if delta > 0.0 {
                    run_substep(world, &mut self.before_step, &mut self.after_step, delta);
                    substeps = 1;
                }
                1.0
            }
            TimeStep::Fixed(step) => {
                let step_len = f64::from(step);
                self.stepping.accumulator += f64::from(delta);
                while self.stepping.accumulator >= step_len {
                    if interpolate {
                        snapshot_bodies(world, &mut self.stepping.previous);
                    }
                    run_substep(world, &mut self.before_step, &mut self.after_step, step);
                    self.stepping.accumulator -= step_len;
                    substeps += 1;
                }
                if interpolate {
                    (self.stepping.accumulator / step_len).clamp(0.0, 1.0) as f32
                } else {
                    1.0
                }
            }
        };

        sync_transforms(world, &mut self.registry, &self.stepping.previous, alpha, scene);

        let collisions = world.drain_collision_events();
        let forces = world.drain_contact_force_events();
        dispatch_collision_events(world, &mut self.registry, &collisions);
        dispatch_contact_force_events(world, &mut self.registry, &forces);

        FrameReport {
            outcome: FrameOutcome::Stepped,
            substeps,
            alpha,
            needs_redraw: world.active_body_count() > 0,
            collision_events: collisions.len(),
            contact_force_events: forces.len(),
        }
    }

    pub fn add_before_step(&mut self, callback: impl FnMut(&mut PhysicsWorld) + 'static) -> StepCallbackId {
        let id = self.next_id();
        self.before_step.push((id, Box::new(callback)));
        id
    }

    pub fn add_after_step(&mut self, callback: impl FnMut(&mut PhysicsWorld) + 'static) -> StepCallbackId {
        let id = self.next_id();
        self.after_step.push((id, Box::new(callback)));
        id
    }

    /// Returns false if no callback had this id.
    pub fn remove_step_callback(&mut self, id: StepCallbackId) -> bool {
        let before = self.before_step.len() + self.after_step.len();
        self.before_step.retain(|(i, _)| *i != id);
        self.after_step.retain(|(i, _)| *i != id);
        before != self.before_step.len() + self.after_step.len()
    }

    fn next_id(&mut self) -> StepCallbackId {
        self.next_callback_id += 1;
        StepCallbackId(self.next_callback_id)
    }

    /// Create a rigid body at `node`'s current world pose and drive `node`
    /// from it.
    pub fn register_rigid_body(
        &mut self,
        scene: &dyn SceneTarget,
        node: DrivenNode,
        options: &RigidBodyOptions,
    ) -> Result<RigidBodyHandle, StepperError> {
        let world = self.manager.world().ok_or(StepperError::NotReady)?;
        let world_matrix = scene
            .world_matrix(node)
            .ok_or(StepperError::UnknownNode(node))?;
        let parent_matrix = scene
            .parent_world_matrix(node)
            .ok_or(StepperError::UnknownNode(node))?;
        let (scale, rotation, position) = world_matrix.to_scale_rotation_translation();

        let handle = world.insert_rigid_body(options.build(position, rotation));
        let is_sleeping = world.rigid_body(handle).is_some_and(|b| b.is_sleeping());
        self.registry.insert_rigid_body(
            handle,
            RigidBodyState {
                node,
                inverse_world: parent_matrix.inverse(),
                scale,
                is_sleeping,
            },
        );
        tracing::debug!(?handle, ?node, "registered rigid body");
        Ok(handle)
    }

    /// Create a collider. With a `parent` the options' offset is relative to
    /// that body; without one it is relative to `node` (or the origin).
    pub fn register_collider(
        &mut self,
        scene: &dyn SceneTarget,
        options: &ColliderOptions,
        parent: Option<RigidBodyHandle>,
        node: Option<NodeId>,
        world_parent: Option<NodeId>,
    ) -> Result<ColliderHandle, StepperError> {
        let world = self.manager.world().ok_or(StepperError::NotReady)?;
        let (offset_position, offset_rotation) = match (parent, node) {
            (Some(body), _) => {
                if world.rigid_body(body).is_none() {
                    return Err(StepperError::UnknownRigidBody(body));
                }
                (glam::Vec3::ZERO, Quat::IDENTITY)
            }
            (None, Some(node)) => {
                let driven = DrivenNode::Single(node);
                let m = scene
                    .world_matrix(driven)
                    .ok_or(StepperError::UnknownNode(driven))?;
                let (_, rotation, position) = m.to_scale_rotation_translation();
                (position, rotation)
            }
            (None, None) => (glam::Vec3::ZERO, Quat::IDENTITY),
        };

        let handle = world.insert_collider(options.build(offset_position, offset_rotation), parent);
        self.registry.insert_collider(
            handle,
            ColliderState {
                body: parent,
                node,
                world_parent,
            },
        );
        refresh_active_events(world, &self.registry, handle);
        tracing::debug!(?handle, ?parent, sensor = options.sensor, "registered collider");
        Ok(handle)
    }

    /// Remove a body, its colliders, and everything registered against them.
    pub fn unregister_rigid_body(&mut self, handle: RigidBodyHandle) -> Result<(), StepperError> {
        let world = self.manager.world().ok_or(StepperError::NotReady)?;
        let removed_world = world.remove_rigid_body(handle).is_some();
        let removed_state = self.registry.remove_rigid_body(handle).is_some();
        self.stepping.previous.remove(&handle);
        if !removed_world && !removed_state {
            return Err(StepperError::UnknownRigidBody(handle));
        }
        tracing::debug!(?handle, "unregistered rigid body");
        Ok(())
    }

    pub fn unregister_collider(&mut self, handle: ColliderHandle) -> Result<(), StepperError> {
        let world = self.manager.world().ok_or(StepperError::NotReady)?;
        let removed_world = world.remove_collider(handle).is_some();
        let removed_state = self.registry.remove_collider(handle).is_some();
        if !removed_world && !removed_state {
            return Err(StepperError::UnknownCollider(handle));
        }
        tracing::debug!(?handle, "unregistered collider");
        Ok(())
    }

    /// Merge listeners into a registered body's entry.
    pub fn subscribe_rigid_body_events(
        &mut self,
        handle: RigidBodyHandle,
        callbacks: EventCallbacks,
    ) -> Result<(), StepperError> {
        if !self.registry.subscribe_rigid_body(handle, callbacks) {
            return Err(StepperError::UnknownRigidBody(handle));
        }
        if let Some(world) = self.manager.world() {
            for collider in self.registry.colliders_of(handle) {
                refresh_active_events(world, &self.registry, collider);
            }
        }
        Ok(())
    }

    /// Merge listeners into a registered collider's entry.
    pub fn subscribe_collider_events(
        &mut self,
        handle: ColliderHandle,
        callbacks: EventCallbacks,
    ) -> Result<(), StepperError> {
        if !self.registry.subscribe_collider(handle, callbacks) {
            return Err(StepperError::UnknownCollider(handle));
        }
        if let Some(world) = self.manager.world() {
            refresh_active_events(world, &self.registry, handle);
        }
        Ok(())
    }

    /// Free the world and forget every registration. The next frame or
    /// registration builds a fresh world.
    pub fn teardown(&mut self) {
        self.registry.clear();
        self.stepping = SteppingState::default();
        self.manager.teardown();
    }
}

fn run_substep(
    world: &mut PhysicsWorld,
    before: &mut [(StepCallbackId, StepCallback)],
    after: &mut [(StepCallbackId, StepCallback)],
    dt: f32,
) {
    for (_, callback) in before.iter_mut() {
        callback(world);
    }
    world.step(dt);
    for (_, callback) in after.iter_mut() {
        callback(world);
    }
}

fn snapshot_bodies(world: &PhysicsWorld, previous: &mut SnapshotMap) {
    previous.clear();
    previous.extend(world.bodies().iter().map(|(handle, body)| {
        (
            handle,
            BodySnapshot {
                position: na_to_vec3(body.translation()),
                rotation: na_to_quat(body.rotation()),
            },
        )
    }));
}

fn refresh_active_events(world: &mut PhysicsWorld, registry: &Registry, handle: ColliderHandle) {
    let mut events = ActiveEvents::COLLISION_EVENTS;
    if registry.wants_contact_force(handle) {
        events |= ActiveEvents::CONTACT_FORCE_EVENTS;
    }
    if let Some(collider) = world.collider_mut(handle) {
        collider.set_active_events(events);
    }
}
