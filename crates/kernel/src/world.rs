use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use glam::Vec3;
use rapier3d::prelude::*;

use crate::config::{ConfigField, PhysicsConfig};
use crate::convert::{na_to_vec3, vec3_to_na};
use crate::error::ConfigError;
use crate::ConfigDiff;

/// Collects engine events during a step until the stepper drains them.
///
/// The engine's handler trait requires `Send + Sync`, hence the mutexes;
/// nothing else touches them concurrently.
#[derive(Default)]
struct EventCollector {
    collisions: Mutex<Vec<CollisionEvent>>,
    contact_forces: Mutex<Vec<ContactForceEvent>>,
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.collisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn handle_contact_force_event(
        &self,
        dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        contact_pair: &ContactPair,
        total_force_magnitude: Real,
    ) {
        let event = ContactForceEvent::from_contact_pair(dt, contact_pair, total_force_magnitude);
        self.contact_forces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Contact natural frequency that yields the given ERP at step length `dt`.
///
/// The engine derives its contact ERP as `dt·ω / (dt·ω + 2ζ)` with `ω = 2π·f`;
/// this solves that relation for `f`.
pub fn contact_frequency_for_erp(erp: Real, dt: Real, damping_ratio: Real) -> Real {
    let omega = 2.0 * damping_ratio * erp / (dt * (1.0 - erp));
    omega / std::f32::consts::TAU
}

/// The physics simulation: rigid bodies, colliders, and everything the engine
/// needs to advance them.
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    params: IntegrationParameters,
    erp: Real,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    events: EventCollector,
    steps: u64,
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("gravity", &self.gravity())
            .field("bodies", &self.bodies.len())
            .field("colliders", &self.colliders.len())
            .field("steps", &self.steps)
            .finish()
    }
}

impl PhysicsWorld {
    /// An empty world with the engine's default solver parameters.
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity: vec3_to_na(gravity),
            params: IntegrationParameters::default(),
            erp: PhysicsConfig::default().erp,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            events: EventCollector::default(),
            steps: 0,
        }
    }

    /// An empty world with every world-level field taken from `config`.
    pub fn from_config(config: &PhysicsConfig) -> Self {
        let mut world = Self::new(config.gravity);
        world.set_max_stabilization_iterations(config.max_stabilization_iterations);
        world.set_max_velocity_friction_iterations(config.max_velocity_friction_iterations);
        world.set_max_velocity_iterations(config.max_velocity_iterations);
        world.set_prediction_distance(config.prediction_distance);
        world.set_erp(config.erp);
        world
    }

    /// Write one configuration field into the live world.
    pub fn apply_field(&mut self, field: ConfigField, config: &PhysicsConfig) {
        match field {
            ConfigField::Gravity => self.set_gravity(config.gravity),
            ConfigField::MaxStabilizationIterations => {
                self.set_max_stabilization_iterations(config.max_stabilization_iterations)
            }
            ConfigField::MaxVelocityFrictionIterations => {
                self.set_max_velocity_friction_iterations(config.max_velocity_friction_iterations)
            }
            ConfigField::MaxVelocityIterations => {
                self.set_max_velocity_iterations(config.max_velocity_iterations)
            }
            ConfigField::PredictionDistance => self.set_prediction_distance(config.prediction_distance),
            ConfigField::Erp => self.set_erp(config.erp),
            ConfigField::TimeStep | ConfigField::Paused | ConfigField::Interpolate => {}
        }
    }

    pub fn gravity(&self) -> Vec3 {
        na_to_vec3(&self.gravity)
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = vec3_to_na(gravity);
    }

    pub fn erp(&self) -> Real {
        self.erp
    }

    /// Takes effect on the next step, where it is converted for that step's length.
    pub fn set_erp(&mut self, erp: Real) {
        self.erp = erp;
    }

    pub fn set_max_velocity_iterations(&mut self, iterations: usize) {
        match NonZeroUsize::new(iterations) {
            Some(n) => self.params.num_solver_iterations = n,
            None => tracing::debug!("ignoring zero velocity iterations"),
        }
    }

    pub fn set_max_velocity_friction_iterations(&mut self, iterations: usize) {
        self.params.num_additional_friction_iterations = iterations;
    }

    pub fn set_max_stabilization_iterations(&mut self, iterations: usize) {
        self.params.num_internal_stabilization_iterations = iterations;
    }

    pub fn set_prediction_distance(&mut self, distance: Real) {
        self.params.normalized_prediction_distance = distance;
    }

    pub fn integration_parameters(&self) -> &IntegrationParameters {
        &self.params
    }

    /// Number of steps taken since construction.
    pub fn step_count(&self) -> u64 {
        self.steps
    }

    /// Advance the simulation by `dt` seconds. Events are queued, not dispatched.
    pub fn step(&mut self, dt: Real) {
        if dt.is_nan() || dt <= 0.0 {
            tracing::debug!(dt, "skipping non-positive step");
            return;
        }
        self.params.dt = dt;
        self.params.contact_natural_frequency =
            contact_frequency_for_erp(self.erp, dt, self.params.contact_damping_ratio);

        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &self.events,
        );
        self.steps += 1;
    }

    pub fn insert_rigid_body(&mut self, body: impl Into<RigidBody>) -> RigidBodyHandle {
        self.bodies.insert(body)
    }

    /// Insert a collider, attached to `parent` when given.
    pub fn insert_collider(
        &mut self,
        collider: impl Into<Collider>,
        parent: Option<RigidBodyHandle>,
    ) -> ColliderHandle {
        match parent {
            Some(parent) => self
                .colliders
                .insert_with_parent(collider, parent, &mut self.bodies),
            None => self.colliders.insert(collider),
        }
    }

    /// Remove a rigid body together with its attached colliders.
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        )
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider> {
        self.colliders
            .remove(handle, &mut self.islands, &mut self.bodies, true)
    }

    pub fn rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn collider_mut(&mut self, handle: ColliderHandle) -> Option<&mut Collider> {
        self.colliders.get_mut(handle)
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    /// Take every collision event queued since the last drain.
    pub fn drain_collision_events(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(
            &mut *self
                .events
                .collisions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Take every contact-force event queued since the last drain.
    pub fn drain_contact_force_events(&mut self) -> Vec<ContactForceEvent> {
        std::mem::take(
            &mut *self
                .events
                .contact_forces
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Contact state between two colliders, if they share a contact pair.
    pub fn contact_pair(&self, a: ColliderHandle, b: ColliderHandle) -> Option<&ContactPair> {
        self.narrow_phase.contact_pair(a, b)
    }

    /// Whether two colliders (at least one a sensor) currently intersect.
    pub fn intersection_pair(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.narrow_phase.intersection_pair(a, b) == Some(true)
    }

    /// Number of dynamic and kinematic bodies the engine considers awake.
    pub fn active_body_count(&self) -> usize {
        self.islands.active_dynamic_bodies().len() + self.islands.active_kinematic_bodies().len()
    }
}

/// Owns the simulation world for one stepper scope.
///
/// The world is built lazily on first access and mutated in place on every
/// config change, so handles stay valid. `teardown` (or dropping the manager)
/// frees it; the next access builds a fresh one.
#[derive(Debug)]
pub struct WorldManager {
    config: PhysicsConfig,
    world: Option<PhysicsWorld>,
    ready: bool,
}

impl WorldManager {
    pub fn new(config: PhysicsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            world: None,
            ready: true,
        })
    }

    /// A manager whose engine is still initializing. `world()` yields `None`
    /// until `mark_ready` is called.
    pub fn deferred(config: PhysicsConfig) -> Result<Self, ConfigError> {
        let mut manager = Self::new(config)?;
        manager.ready = false;
        Ok(manager)
    }

    pub fn mark_ready(&mut self) {
        if !self.ready {
            tracing::debug!("physics engine ready");
        }
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The last applied configuration.
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// The world, built on first access. `None` while the engine is not ready.
    pub fn world(&mut self) -> Option<&mut PhysicsWorld> {
        if !self.ready {
            return None;
        }
        let config = &self.config;
        Some(self.world.get_or_insert_with(|| {
            tracing::debug!(gravity = ?config.gravity, "constructing physics world");
            PhysicsWorld::from_config(config)
        }))
    }

    /// The world if it has already been built.
    pub fn peek(&self) -> Option<&PhysicsWorld> {
        self.world.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.world.is_some()
    }

    /// Validate `next`, write the changed world fields into the live world,
    /// and remember `next` as the applied config.
    pub fn apply_config(&mut self, next: PhysicsConfig) -> Result<ConfigDiff, ConfigError> {
        next.validate()?;
        let diff = self.config.diff(&next);
        if let Some(world) = self.world.as_mut() {
            for field in diff.world_fields() {
                world.apply_field(field, &next);
            }
        }
        if !diff.is_empty() {
            tracing::debug!(changed = ?diff.changed, "applied physics config");
        }
        self.config = next;
        Ok(diff)
    }

    /// Free the world. A later `world()` call builds a new one.
    pub fn teardown(&mut self) {
        if let Some(world) = self.world.take() {
            tracing::debug!(
                bodies = world.bodies().len(),
                colliders = world.colliders().len(),
                "tearing down physics world"
            );
        }
    }
}

impl Drop for WorldManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(world: &mut PhysicsWorld, y: f32) -> RigidBodyHandle {
        let body = world.insert_rigid_body(
            RigidBodyBuilder::dynamic().translation(vec3_to_na(Vec3::new(0.0, y, 0.0))),
        );
        world.insert_collider(ColliderBuilder::ball(0.5), Some(body));
        body
    }

    #[test]
    fn world_steps_and_counts() {
        let mut world = PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0));
        let body = ball_at(&mut world, 10.0);
        world.step(1.0 / 60.0);
        world.step(1.0 / 60.0);
        assert_eq!(world.step_count(), 2);
        assert!(world.rigid_body(body).unwrap().translation().y < 10.0);
    }

    #[test]
    fn non_positive_step_is_skipped() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        world.step(0.0);
        world.step(-1.0);
        assert_eq!(world.step_count(), 0);
    }

    #[test]
    fn sensor_overlap_is_reported_as_intersection() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let sensor = world.insert_collider(ColliderBuilder::cuboid(1.0, 1.0, 1.0).sensor(true), None);
        let body = ball_at(&mut world, 0.0);
        let ball = world.rigid_body(body).unwrap().colliders()[0];

        world.step(1.0 / 60.0);
        assert!(world.intersection_pair(sensor, ball));
        assert!(world.intersection_pair(ball, sensor));

        world
            .rigid_body_mut(body)
            .unwrap()
            .set_translation(vec3_to_na(Vec3::new(0.0, 10.0, 0.0)), true);
        world.step(1.0 / 60.0);
        assert!(!world.intersection_pair(sensor, ball));
    }

    #[test]
    fn removing_body_removes_its_colliders() {
        let mut world = PhysicsWorld::new(Vec3::ZERO);
        let body = ball_at(&mut world, 0.0);
        assert_eq!(world.colliders().len(), 1);
        assert!(world.remove_rigid_body(body).is_some());
        assert_eq!(world.colliders().len(), 0);
        assert!(world.rigid_body(body).is_none());
    }

    #[test]
    fn erp_frequency_inverts_engine_relation() {
        let dt = 1.0 / 60.0;
        let zeta = 5.0;
        let f = contact_frequency_for_erp(0.24, dt, zeta);
        let omega = f * std::f32::consts::TAU;
        let erp = dt * omega / (dt * omega + 2.0 * zeta);
        assert!((erp - 0.24).abs() < 1e-5);
    }

    #[test]
    fn from_config_writes_solver_fields() {
        let config = PhysicsConfig {
            max_velocity_iterations: 7,
            max_velocity_friction_iterations: 3,
            max_stabilization_iterations: 5,
            prediction_distance: 0.01,
            erp: 0.5,
            ..PhysicsConfig::default()
        };
        let world = PhysicsWorld::from_config(&config);
        let params = world.integration_parameters();
        assert_eq!(params.num_solver_iterations.get(), 7);
        assert_eq!(params.num_additional_friction_iterations, 3);
        assert_eq!(params.num_internal_stabilization_iterations, 5);
        assert_eq!(params.normalized_prediction_distance, 0.01);
        assert_eq!(world.erp(), 0.5);
    }

    #[test]
    fn manager_builds_world_lazily() {
        let mut manager = WorldManager::new(PhysicsConfig::default()).unwrap();
        assert!(manager.peek().is_none());
        assert!(manager.world().is_some());
        assert!(manager.is_live());
    }

    #[test]
    fn deferred_manager_is_not_ready_until_marked() {
        let mut manager = WorldManager::deferred(PhysicsConfig::default()).unwrap();
        assert!(!manager.is_ready());
        assert!(manager.world().is_none());
        assert!(!manager.is_live());
        manager.mark_ready();
        assert!(manager.is_ready());
        assert!(manager.world().is_some());
    }

    #[test]
    fn manager_rejects_invalid_config() {
        let config = PhysicsConfig {
            time_step: crate::TimeStep::Fixed(0.0),
            ..PhysicsConfig::default()
        };
        assert!(WorldManager::new(config).is_err());
    }

    #[test]
    fn apply_config_mutates_in_place_and_keeps_handles() {
        let mut manager = WorldManager::new(PhysicsConfig::default()).unwrap();
        let body = ball_at(manager.world().unwrap(), 3.0);

        let next = PhysicsConfig {
            gravity: Vec3::new(0.0, -1.62, 0.0),
            max_velocity_iterations: 12,
            ..PhysicsConfig::default()
        };
        let diff = manager.apply_config(next).unwrap();
        assert!(diff.contains(ConfigField::Gravity));
        assert!(diff.contains(ConfigField::MaxVelocityIterations));

        let world = manager.world().unwrap();
        assert_eq!(world.gravity(), Vec3::new(0.0, -1.62, 0.0));
        assert_eq!(world.integration_parameters().num_solver_iterations.get(), 12);
        assert!(world.rigid_body(body).is_some());
    }

    #[test]
    fn apply_config_rejects_invalid_and_keeps_previous() {
        let mut manager = WorldManager::new(PhysicsConfig::default()).unwrap();
        let bad = PhysicsConfig {
            time_step: crate::TimeStep::Fixed(-1.0),
            ..PhysicsConfig::default()
        };
        assert!(manager.apply_config(bad).is_err());
        assert_eq!(manager.config(), &PhysicsConfig::default());
    }

    #[test]
    fn teardown_then_access_rebuilds_empty_world() {
        let mut manager = WorldManager::new(PhysicsConfig::default()).unwrap();
        ball_at(manager.world().unwrap(), 0.0);
        manager.teardown();
        assert!(manager.peek().is_none());
        let world = manager.world().unwrap();
        assert_eq!(world.bodies().len(), 0);
    }
}
