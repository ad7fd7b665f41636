//! Joint parameter records.
//!
//! One plain record per joint family, owned by the scene and read by the
//! solver initializers every step. Records are kept in separate homogeneous
//! arrays per family rather than one enum so the SIMD path can gather them
//! lane by lane.
//!
//! Limits and motors use sentinel values instead of `Option`:
//!
//! | Field                       | Disabled when |
//! |-----------------------------|---------------|
//! | hinge `min_rotation_limit`  | `> 0`         |
//! | hinge `max_rotation_limit`  | `< 0`         |
//! | cone `swing_limit`, `twist_limit` | `< 0`   |
//! | slider `neg_distance_limit` | `> 0`         |
//! | slider `pos_distance_limit` | `< 0`         |
//! | any max motor torque/force  | `<= 0`        |

use glam::{Quat, Vec3};

use crate::math::tangents;
use crate::transform::Transform;

/// How a joint motor picks its target velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotorType {
    /// Drive the relative velocity towards a fixed value.
    #[default]
    Velocity,
    /// Drive towards a target angle or distance, reached within one step if the motor is strong enough.
    Position,
}

/// Joint family tag, used by the scene graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Distance,
    Ball,
    Fixed,
    Hinge,
    ConeTwist,
    Slider,
}

/// Keeps two anchor points at a fixed distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConstraint {
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub global_length: f32,
}

impl DistanceConstraint {
    pub fn from_local_points(local_anchor_a: Vec3, local_anchor_b: Vec3, global_length: f32) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            global_length,
        }
    }

    /// The rest length is the current distance between the two anchors.
    pub fn from_global_points(a: &Transform, b: &Transform, global_anchor_a: Vec3, global_anchor_b: Vec3) -> Self {
        Self {
            local_anchor_a: a.inverse_transform_position(global_anchor_a),
            local_anchor_b: b.inverse_transform_position(global_anchor_b),
            global_length: global_anchor_a.distance(global_anchor_b),
        }
    }
}

/// Point-to-point joint: three translational degrees of freedom locked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallConstraint {
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
}

impl BallConstraint {
    pub fn from_local_points(local_anchor_a: Vec3, local_anchor_b: Vec3) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
        }
    }

    pub fn from_global_points(a: &Transform, b: &Transform, global_anchor: Vec3) -> Self {
        Self {
            local_anchor_a: a.inverse_transform_position(global_anchor),
            local_anchor_b: b.inverse_transform_position(global_anchor),
        }
    }
}

/// Weld joint: all six degrees of freedom locked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedConstraint {
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    /// `conj(q_B) * q_A` at creation time.
    pub initial_inv_rotation_difference: Quat,
}

impl FixedConstraint {
    /// Weld with the bodies' current relative rotation taken as identity.
    pub fn from_local_points(local_anchor_a: Vec3, local_anchor_b: Vec3) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            initial_inv_rotation_difference: Quat::IDENTITY,
        }
    }

    pub fn from_global_points(a: &Transform, b: &Transform, global_anchor: Vec3) -> Self {
        Self {
            local_anchor_a: a.inverse_transform_position(global_anchor),
            local_anchor_b: b.inverse_transform_position(global_anchor),
            initial_inv_rotation_difference: b.rotation.conjugate() * a.rotation,
        }
    }
}

/// Revolute joint with an optional angle limit and motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeConstraint {
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub local_hinge_axis_a: Vec3,
    pub local_hinge_axis_b: Vec3,
    /// Reference direction for the hinge angle, in A's space.
    pub local_hinge_tangent_a: Vec3,
    pub local_hinge_bitangent_a: Vec3,
    /// `local_hinge_tangent_a` as seen from B at creation time.
    pub local_hinge_tangent_b: Vec3,

    pub min_rotation_limit: f32,
    pub max_rotation_limit: f32,

    pub motor_type: MotorType,
    pub motor_velocity: f32,
    pub motor_target_angle: f32,
    pub max_motor_torque: f32,
}

impl HingeConstraint {
    pub fn from_global_points(
        a: &Transform,
        b: &Transform,
        global_anchor: Vec3,
        global_hinge_axis: Vec3,
        min_limit: f32,
        max_limit: f32,
    ) -> Self {
        let local_hinge_axis_a = a.inverse_transform_direction(global_hinge_axis);
        let local_hinge_axis_b = b.inverse_transform_direction(global_hinge_axis);
        let (local_hinge_tangent_a, local_hinge_bitangent_a) = tangents(local_hinge_axis_a);
        let local_hinge_tangent_b = b.rotation.conjugate() * (a.rotation * local_hinge_tangent_a);

        Self {
            local_anchor_a: a.inverse_transform_position(global_anchor),
            local_anchor_b: b.inverse_transform_position(global_anchor),
            local_hinge_axis_a,
            local_hinge_axis_b,
            local_hinge_tangent_a,
            local_hinge_bitangent_a,
            local_hinge_tangent_b,
            min_rotation_limit: min_limit,
            max_rotation_limit: max_limit,
            motor_type: MotorType::Velocity,
            motor_velocity: 0.0,
            motor_target_angle: 0.0,
            max_motor_torque: -1.0,
        }
    }

    pub fn with_velocity_motor(mut self, velocity: f32, max_torque: f32) -> Self {
        self.motor_type = MotorType::Velocity;
        self.motor_velocity = velocity;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_position_motor(mut self, target_angle: f32, max_torque: f32) -> Self {
        self.motor_type = MotorType::Position;
        self.motor_target_angle = target_angle;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn has_limits(&self) -> bool {
        self.min_rotation_limit <= 0.0 || self.max_rotation_limit >= 0.0
    }
}

/// Ball joint with a swing cone, a twist range, and optional swing/twist motors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeTwistConstraint {
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub local_limit_axis_a: Vec3,
    pub local_limit_axis_b: Vec3,
    pub local_limit_tangent_a: Vec3,
    pub local_limit_bitangent_a: Vec3,
    pub local_limit_tangent_b: Vec3,

    /// Half-angle of the swing cone.
    pub swing_limit: f32,
    /// Symmetric twist range `[-twist_limit, twist_limit]`.
    pub twist_limit: f32,

    pub swing_motor_type: MotorType,
    pub swing_motor_velocity: f32,
    pub max_swing_motor_torque: f32,
    /// Direction of the swing motor in the tangent plane, as an angle from the tangent.
    pub swing_motor_axis: f32,
    pub swing_motor_target_angle: f32,

    pub twist_motor_type: MotorType,
    pub twist_motor_velocity: f32,
    pub max_twist_motor_torque: f32,
    pub twist_motor_target_angle: f32,
}

impl ConeTwistConstraint {
    pub fn from_global_points(
        a: &Transform,
        b: &Transform,
        global_anchor: Vec3,
        global_axis: Vec3,
        swing_limit: f32,
        twist_limit: f32,
    ) -> Self {
        let local_limit_axis_a = a.inverse_transform_direction(global_axis);
        let local_limit_axis_b = b.inverse_transform_direction(global_axis);
        let (local_limit_tangent_a, local_limit_bitangent_a) = tangents(local_limit_axis_a);
        let local_limit_tangent_b = b.rotation.conjugate() * (a.rotation * local_limit_tangent_a);

        Self {
            local_anchor_a: a.inverse_transform_position(global_anchor),
            local_anchor_b: b.inverse_transform_position(global_anchor),
            local_limit_axis_a,
            local_limit_axis_b,
            local_limit_tangent_a,
            local_limit_bitangent_a,
            local_limit_tangent_b,
            swing_limit,
            twist_limit,
            swing_motor_type: MotorType::Velocity,
            swing_motor_velocity: 0.0,
            max_swing_motor_torque: -1.0,
            swing_motor_axis: 0.0,
            swing_motor_target_angle: 0.0,
            twist_motor_type: MotorType::Velocity,
            twist_motor_velocity: 0.0,
            max_twist_motor_torque: -1.0,
            twist_motor_target_angle: 0.0,
        }
    }

    pub fn with_swing_velocity_motor(mut self, axis_angle: f32, velocity: f32, max_torque: f32) -> Self {
        self.swing_motor_type = MotorType::Velocity;
        self.swing_motor_axis = axis_angle;
        self.swing_motor_velocity = velocity;
        self.max_swing_motor_torque = max_torque;
        self
    }

    pub fn with_swing_position_motor(mut self, axis_angle: f32, target_angle: f32, max_torque: f32) -> Self {
        self.swing_motor_type = MotorType::Position;
        self.swing_motor_axis = axis_angle;
        self.swing_motor_target_angle = target_angle;
        self.max_swing_motor_torque = max_torque;
        self
    }

    pub fn with_twist_velocity_motor(mut self, velocity: f32, max_torque: f32) -> Self {
        self.twist_motor_type = MotorType::Velocity;
        self.twist_motor_velocity = velocity;
        self.max_twist_motor_torque = max_torque;
        self
    }

    pub fn with_twist_position_motor(mut self, target_angle: f32, max_torque: f32) -> Self {
        self.twist_motor_type = MotorType::Position;
        self.twist_motor_target_angle = target_angle;
        self.max_twist_motor_torque = max_torque;
        self
    }
}

/// Prismatic joint: translation along one axis of A, rotation locked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderConstraint {
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub local_axis_a: Vec3,
    /// `conj(q_B) * q_A` at creation time.
    pub initial_inv_rotation_difference: Quat,

    pub neg_distance_limit: f32,
    pub pos_distance_limit: f32,

    pub motor_type: MotorType,
    pub motor_velocity: f32,
    pub motor_target_distance: f32,
    pub max_motor_force: f32,
}

impl SliderConstraint {
    pub fn from_global_points(
        a: &Transform,
        b: &Transform,
        global_anchor: Vec3,
        global_axis: Vec3,
        min_limit: f32,
        max_limit: f32,
    ) -> Self {
        Self {
            local_anchor_a: a.inverse_transform_position(global_anchor),
            local_anchor_b: b.inverse_transform_position(global_anchor),
            local_axis_a: a.inverse_transform_direction(global_axis),
            initial_inv_rotation_difference: b.rotation.conjugate() * a.rotation,
            neg_distance_limit: min_limit,
            pos_distance_limit: max_limit,
            motor_type: MotorType::Velocity,
            motor_velocity: 0.0,
            motor_target_distance: 0.0,
            max_motor_force: -1.0,
        }
    }

    pub fn with_velocity_motor(mut self, velocity: f32, max_force: f32) -> Self {
        self.motor_type = MotorType::Velocity;
        self.motor_velocity = velocity;
        self.max_motor_force = max_force;
        self
    }

    pub fn with_position_motor(mut self, target_distance: f32, max_force: f32) -> Self {
        self.motor_type = MotorType::Position;
        self.motor_target_distance = target_distance;
        self.max_motor_force = max_force;
        self
    }
}
