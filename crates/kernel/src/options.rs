//! Registration options, translated into engine builders.

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use crate::convert::{quat_to_na, vec3_to_na};

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyOptions {
    pub kind: RigidBodyType,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub gravity_scale: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub can_sleep: bool,
    pub ccd: bool,
}

impl Default for RigidBodyOptions {
    fn default() -> Self {
        Self {
            kind: RigidBodyType::Dynamic,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            can_sleep: true,
            ccd: false,
        }
    }
}

impl RigidBodyOptions {
    pub fn dynamic() -> Self {
        Self::default()
    }

    pub fn fixed() -> Self {
        Self {
            kind: RigidBodyType::Fixed,
            ..Self::default()
        }
    }

    pub fn kinematic() -> Self {
        Self {
            kind: RigidBodyType::KinematicPositionBased,
            ..Self::default()
        }
    }

    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Build the body at a world-space pose.
    pub fn build(&self, position: Vec3, rotation: Quat) -> RigidBody {
        RigidBodyBuilder::new(self.kind)
            .translation(vec3_to_na(position))
            .rotation(quat_to_na(rotation).scaled_axis())
            .linvel(vec3_to_na(self.linear_velocity))
            .angvel(vec3_to_na(self.angular_velocity))
            .gravity_scale(self.gravity_scale)
            .linear_damping(self.linear_damping)
            .angular_damping(self.angular_damping)
            .can_sleep(self.can_sleep)
            .ccd_enabled(self.ccd)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    Ball { radius: f32 },
    Cuboid { half_extents: Vec3 },
    /// Y-aligned.
    Capsule { half_height: f32, radius: f32 },
    /// Y-aligned.
    Cylinder { half_height: f32, radius: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColliderOptions {
    pub shape: ColliderShape,
    pub sensor: bool,
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
    /// Offset from the parent body, or from the collider's node when standalone.
    pub translation: Vec3,
    pub rotation: Quat,
    /// Contact forces at or below this magnitude are not reported.
    pub contact_force_event_threshold: f32,
}

impl ColliderOptions {
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            sensor: false,
            friction: 0.5,
            restitution: 0.0,
            density: 1.0,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            contact_force_event_threshold: 0.0,
        }
    }

    pub fn ball(radius: f32) -> Self {
        Self::new(ColliderShape::Ball { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(ColliderShape::Cuboid { half_extents })
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Build the collider with `offset` applied on top of the configured
    /// translation and rotation. Collision events are always enabled.
    pub fn build(&self, offset_position: Vec3, offset_rotation: Quat) -> Collider {
        let builder = match self.shape {
            ColliderShape::Ball { radius } => ColliderBuilder::ball(radius),
            ColliderShape::Cuboid { half_extents: h } => ColliderBuilder::cuboid(h.x, h.y, h.z),
            ColliderShape::Capsule {
                half_height,
                radius,
            } => ColliderBuilder::capsule_y(half_height, radius),
            ColliderShape::Cylinder {
                half_height,
                radius,
            } => ColliderBuilder::cylinder(half_height, radius),
        };
        let position = offset_position + offset_rotation * self.translation;
        let rotation = offset_rotation * self.rotation;
        builder
            .translation(vec3_to_na(position))
            .rotation(quat_to_na(rotation).scaled_axis())
            .sensor(self.sensor)
            .friction(self.friction)
            .restitution(self.restitution)
            .density(self.density)
            .contact_force_event_threshold(self.contact_force_event_threshold)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{na_to_quat, na_to_vec3};

    #[test]
    fn body_starts_at_requested_pose() {
        let rotation = Quat::from_rotation_z(0.4);
        let body = RigidBodyOptions::dynamic()
            .with_linear_velocity(Vec3::X)
            .build(Vec3::new(1.0, 2.0, 3.0), rotation);
        assert_eq!(na_to_vec3(body.translation()), Vec3::new(1.0, 2.0, 3.0));
        assert!(na_to_quat(body.rotation()).abs_diff_eq(rotation, 1e-5));
        assert_eq!(na_to_vec3(body.linvel()), Vec3::X);
        assert!(body.is_dynamic());
    }

    #[test]
    fn fixed_body_kind() {
        let body = RigidBodyOptions::fixed().build(Vec3::ZERO, Quat::IDENTITY);
        assert!(body.is_fixed());
    }

    #[test]
    fn kinematic_body_keeps_gravity_scale() {
        let body = RigidBodyOptions::kinematic()
            .with_gravity_scale(0.25)
            .build(Vec3::ZERO, Quat::IDENTITY);
        assert!(body.is_kinematic());
        assert_eq!(body.gravity_scale(), 0.25);
    }

    #[test]
    fn collider_offsets_compose() {
        let options = ColliderOptions {
            translation: Vec3::new(1.0, 0.0, 0.0),
            ..ColliderOptions::ball(0.5)
        };
        let collider = options.build(
            Vec3::new(0.0, 2.0, 0.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let translation = na_to_vec3(&collider.position().translation.vector);
        assert!(translation.abs_diff_eq(Vec3::new(0.0, 2.0, -1.0), 1e-5));
    }

    #[test]
    fn collider_reports_collision_events() {
        let collider = ColliderOptions::cuboid(Vec3::ONE).sensor().build(Vec3::ZERO, Quat::IDENTITY);
        assert!(collider.is_sensor());
        assert!(collider.active_events().contains(ActiveEvents::COLLISION_EVENTS));
        assert!(!collider.active_events().contains(ActiveEvents::CONTACT_FORCE_EVENTS));
    }
}
