use rigidsync_common::DrivenNode;
use rigidsync_kernel::convert::{na_to_quat, na_to_vec3};
use rigidsync_kernel::rapier3d::prelude::RigidBodyHandle;
use rigidsync_kernel::Stepper;

/// Stepper inspector for developer tooling.
///
/// Read-only queries against a stepper and its world, for debugging and the CLI.
pub struct StepperInspector;

impl StepperInspector {
    /// Produce a summary of the stepper state. World counts are zero until
    /// the world has been built.
    pub fn summary(stepper: &Stepper) -> StepperSummary {
        let world = stepper.world();
        StepperSummary {
            live: world.is_some(),
            steps: world.map_or(0, |w| w.step_count()),
            total_substeps: stepper.total_substeps(),
            accumulator: stepper.accumulator(),
            bodies: world.map_or(0, |w| w.bodies().len()),
            colliders: world.map_or(0, |w| w.colliders().len()),
            registered_bodies: stepper.registry().rigid_body_count(),
            registered_colliders: stepper.registry().collider_count(),
            active_bodies: world.map_or(0, |w| w.active_body_count()),
            paused: stepper.config().paused,
        }
    }

    /// Pose and state of one registered body, if it is still alive.
    pub fn inspect_body(stepper: &Stepper, handle: RigidBodyHandle) -> Option<BodyInfo> {
        let state = stepper.registry().rigid_body(handle)?;
        let body = stepper.world()?.rigid_body(handle)?;
        let p = na_to_vec3(body.translation());
        let r = na_to_quat(body.rotation());
        let v = na_to_vec3(body.linvel());
        Some(BodyInfo {
            handle,
            node: state.node,
            position: p.to_array(),
            rotation: r.to_array(),
            linear_velocity: v.to_array(),
            sleeping: body.is_sleeping(),
        })
    }

    /// Registered body handles, in handle order.
    pub fn list_bodies(stepper: &Stepper) -> Vec<RigidBodyHandle> {
        let mut handles: Vec<_> = stepper.registry().rigid_bodies().map(|(h, _)| h).collect();
        handles.sort_by_key(|h| h.into_raw_parts());
        handles
    }
}

/// Summary of stepper state for the inspector.
#[derive(Debug, Clone)]
pub struct StepperSummary {
    pub live: bool,
    pub steps: u64,
    pub total_substeps: u64,
    pub accumulator: f64,
    pub bodies: usize,
    pub colliders: usize,
    pub registered_bodies: usize,
    pub registered_colliders: usize,
    pub active_bodies: usize,
    pub paused: bool,
}

impl std::fmt::Display for StepperSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stepper: live={} steps={} substeps={} acc={:.4} bodies={}/{} colliders={}/{} active={} paused={}",
            self.live,
            self.steps,
            self.total_substeps,
            self.accumulator,
            self.registered_bodies,
            self.bodies,
            self.registered_colliders,
            self.colliders,
            self.active_bodies,
            self.paused,
        )
    }
}

/// Detailed info about a single body.
#[derive(Debug, Clone)]
pub struct BodyInfo {
    pub handle: RigidBodyHandle,
    pub node: DrivenNode,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub linear_velocity: [f32; 3],
    pub sleeping: bool,
}

impl std::fmt::Display for BodyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (index, generation) = self.handle.into_raw_parts();
        let node = match self.node {
            DrivenNode::Single(id) => format!("node {}", id.0),
            DrivenNode::InstanceSlot { mesh, index } => format!("mesh {} slot {index}", mesh.0),
        };
        write!(
            f,
            "Body [{index}v{generation}] {node} pos=({:.2}, {:.2}, {:.2}) vel=({:.2}, {:.2}, {:.2}){}",
            self.position[0],
            self.position[1],
            self.position[2],
            self.linear_velocity[0],
            self.linear_velocity[1],
            self.linear_velocity[2],
            if self.sleeping { " sleeping" } else { "" },
        )
    }
}
