//! Lane-wide math for the SIMD constraint path.
//!
//! Each type stores one component per SIMD lane (structure of arrays), so a
//! `Vec3W` holds `SIMD_WIDTH` independent vectors. Branches in the scalar
//! initializers become lane masks combined with [`select`].
//!
//! Gathering and scattering go through the body table by index; the batch
//! scheduler guarantees that no two lanes of a batch name the same real body,
//! so scattered writes never race.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use glam::{Mat3, Quat, Vec2, Vec3};
use wide::{f32x4, CmpEq, CmpGt, CmpLt, CmpNe};

use super::body::{BodyIndex, RigidBodyState};
use crate::math::TANGENT_SWITCH;

/// Number of constraints solved together in one batch.
pub const SIMD_WIDTH: usize = 4;

/// One `f32` per lane.
pub type FloatW = f32x4;

/// Lane mask: all bits set for true lanes, zero for false lanes.
pub type MaskW = f32x4;

#[inline]
pub fn splat(x: f32) -> FloatW {
    f32x4::splat(x)
}

/// Pick `if_true` where `mask` is set, `if_false` elsewhere.
#[inline]
pub fn select<T: Select>(mask: MaskW, if_true: T, if_false: T) -> T {
    T::select(mask, if_true, if_false)
}

/// Types that can be blended lane by lane.
pub trait Select: Sized {
    fn select(mask: MaskW, if_true: Self, if_false: Self) -> Self;
}

impl Select for FloatW {
    #[inline]
    fn select(mask: MaskW, if_true: Self, if_false: Self) -> Self {
        mask.blend(if_true, if_false)
    }
}

/// True if any lane of `mask` is set.
#[inline]
pub fn any(mask: MaskW) -> bool {
    mask.move_mask() != 0
}

/// `atan2(y, x)` per lane, zero where both inputs are zero.
#[inline]
pub fn atan2(y: FloatW, x: FloatW) -> FloatW {
    let degenerate = y.cmp_eq(FloatW::ZERO) & x.cmp_eq(FloatW::ZERO);
    select(degenerate, FloatW::ZERO, y.atan2(x))
}

/// Lane mask from one bool per lane.
pub fn mask_from_bools(lanes: [bool; SIMD_WIDTH]) -> MaskW {
    let ones = f32::from_bits(u32::MAX);
    f32x4::from(lanes.map(|b| if b { ones } else { 0.0 }))
}

/// `1 / x` per lane, zero where `x` is zero.
#[inline]
pub fn inverse_or_zero(x: FloatW) -> FloatW {
    select(x.cmp_ne(FloatW::ZERO), FloatW::ONE / x, FloatW::ZERO)
}

/// Gather one `f32` per lane.
#[inline]
pub fn gather_f32(f: impl Fn(usize) -> f32) -> FloatW {
    f32x4::from(std::array::from_fn::<f32, SIMD_WIDTH, _>(f))
}

#[derive(Debug, Clone, Copy)]
pub struct Vec2W {
    pub x: FloatW,
    pub y: FloatW,
}

impl Vec2W {
    pub const ZERO: Self = Self::new(FloatW::ZERO, FloatW::ZERO);

    pub const fn new(x: FloatW, y: FloatW) -> Self {
        Self { x, y }
    }

    pub fn to_lanes(self) -> [Vec2; SIMD_WIDTH] {
        let (x, y) = (self.x.to_array(), self.y.to_array());
        std::array::from_fn(|i| Vec2::new(x[i], y[i]))
    }
}

impl Add for Vec2W {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2W {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<FloatW> for Vec2W {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: FloatW) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2W {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Vec3W {
    pub x: FloatW,
    pub y: FloatW,
    pub z: FloatW,
}

impl Vec3W {
    pub const ZERO: Self = Self::new(FloatW::ZERO, FloatW::ZERO, FloatW::ZERO);

    pub const fn new(x: FloatW, y: FloatW, z: FloatW) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: Vec3) -> Self {
        Self::new(splat(v.x), splat(v.y), splat(v.z))
    }

    pub fn from_lanes(v: [Vec3; SIMD_WIDTH]) -> Self {
        Self::new(
            f32x4::from(v.map(|v| v.x)),
            f32x4::from(v.map(|v| v.y)),
            f32x4::from(v.map(|v| v.z)),
        )
    }

    /// Gather one vector per lane.
    #[inline]
    pub fn gather(f: impl Fn(usize) -> Vec3) -> Self {
        Self::from_lanes(std::array::from_fn(f))
    }

    pub fn to_lanes(self) -> [Vec3; SIMD_WIDTH] {
        let (x, y, z) = (self.x.to_array(), self.y.to_array(), self.z.to_array());
        std::array::from_fn(|i| Vec3::new(x[i], y[i], z[i]))
    }

    #[inline]
    pub fn dot(self, rhs: Self) -> FloatW {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - rhs.y * self.z,
            self.z * rhs.x - rhs.z * self.x,
            self.x * rhs.y - rhs.x * self.y,
        )
    }

    #[inline]
    pub fn length(self) -> FloatW {
        self.dot(self).sqrt()
    }

    /// Normalize, or zero for zero-length lanes.
    pub fn noz(self) -> Self {
        let len = self.length();
        let normalized = self * (FloatW::ONE / len);
        select(len.cmp_gt(FloatW::ZERO), normalized, Self::ZERO)
    }
}

impl Select for Vec3W {
    #[inline]
    fn select(mask: MaskW, if_true: Self, if_false: Self) -> Self {
        Self::new(
            mask.blend(if_true.x, if_false.x),
            mask.blend(if_true.y, if_false.y),
            mask.blend(if_true.z, if_false.z),
        )
    }
}

impl Add for Vec3W {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3W {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3W {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<FloatW> for Vec3W {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: FloatW) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl AddAssign for Vec3W {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vec3W {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuatW {
    pub x: FloatW,
    pub y: FloatW,
    pub z: FloatW,
    pub w: FloatW,
}

impl QuatW {
    pub const fn new(x: FloatW, y: FloatW, z: FloatW, w: FloatW) -> Self {
        Self { x, y, z, w }
    }

    pub fn gather(f: impl Fn(usize) -> Quat) -> Self {
        let q: [Quat; SIMD_WIDTH] = std::array::from_fn(f);
        Self::new(
            f32x4::from(q.map(|q| q.x)),
            f32x4::from(q.map(|q| q.y)),
            f32x4::from(q.map(|q| q.z)),
            f32x4::from(q.map(|q| q.w)),
        )
    }

    /// Rotation of `angle` about the unit vector `axis`.
    pub fn from_axis_angle(axis: Vec3W, angle: FloatW) -> Self {
        let (s, c) = (angle * splat(0.5)).sin_cos();
        let v = axis * s;
        Self::new(v.x, v.y, v.z, c)
    }

    #[inline]
    pub fn vector(self) -> Vec3W {
        Vec3W::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn normalize(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        let inv = FloatW::ONE / len;
        Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
    }

    /// Rotate `v` by this unit quaternion. The zero quaternion maps every vector to zero, as in glam.
    pub fn rotate(self, v: Vec3W) -> Vec3W {
        let b = self.vector();
        let b2 = b.dot(b);
        v * (self.w * self.w - b2) + b * (v.dot(b) * splat(2.0)) + b.cross(v) * (self.w * splat(2.0))
    }
}

impl Select for QuatW {
    #[inline]
    fn select(mask: MaskW, if_true: Self, if_false: Self) -> Self {
        Self::new(
            mask.blend(if_true.x, if_false.x),
            mask.blend(if_true.y, if_false.y),
            mask.blend(if_true.z, if_false.z),
            mask.blend(if_true.w, if_false.w),
        )
    }
}

impl Mul for QuatW {
    type Output = Self;
    fn mul(self, b: Self) -> Self {
        let a = self;
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }
}

/// Column-major 2x2 matrix per lane.
#[derive(Debug, Clone, Copy)]
pub struct Mat2W {
    pub m00: FloatW,
    pub m01: FloatW,
    pub m10: FloatW,
    pub m11: FloatW,
}

/// Column-major 3x3 matrix per lane.
#[derive(Debug, Clone, Copy)]
pub struct Mat3W {
    pub x_axis: Vec3W,
    pub y_axis: Vec3W,
    pub z_axis: Vec3W,
}

impl Mat3W {
    pub const ZERO: Self = Self::from_cols(Vec3W::ZERO, Vec3W::ZERO, Vec3W::ZERO);

    pub const fn from_cols(x_axis: Vec3W, y_axis: Vec3W, z_axis: Vec3W) -> Self {
        Self { x_axis, y_axis, z_axis }
    }

    pub fn gather(f: impl Fn(usize) -> Mat3) -> Self {
        let m: [Mat3; SIMD_WIDTH] = std::array::from_fn(f);
        Self::from_cols(
            Vec3W::from_lanes(m.map(|m| m.x_axis)),
            Vec3W::from_lanes(m.map(|m| m.y_axis)),
            Vec3W::from_lanes(m.map(|m| m.z_axis)),
        )
    }

    #[inline]
    pub fn mul_vec3(&self, v: Vec3W) -> Vec3W {
        self.x_axis * v.x + self.y_axis * v.y + self.z_axis * v.z
    }

    pub fn mul_mat3(&self, rhs: &Self) -> Self {
        Self::from_cols(
            self.mul_vec3(rhs.x_axis),
            self.mul_vec3(rhs.y_axis),
            self.mul_vec3(rhs.z_axis),
        )
    }

    pub fn transpose(&self) -> Self {
        Self::from_cols(
            Vec3W::new(self.x_axis.x, self.y_axis.x, self.z_axis.x),
            Vec3W::new(self.x_axis.y, self.y_axis.y, self.z_axis.y),
            Vec3W::new(self.x_axis.z, self.y_axis.z, self.z_axis.z),
        )
    }

    pub fn add_diagonal(mut self, d: FloatW) -> Self {
        self.x_axis.x += d;
        self.y_axis.y += d;
        self.z_axis.z += d;
        self
    }
}

impl Add for Mat3W {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::from_cols(self.x_axis + rhs.x_axis, self.y_axis + rhs.y_axis, self.z_axis + rhs.z_axis)
    }
}

/// Cross-product matrix per lane.
pub fn skew(v: Vec3W) -> Mat3W {
    let zero = FloatW::ZERO;
    Mat3W::from_cols(
        Vec3W::new(zero, v.z, -v.y),
        Vec3W::new(-v.z, zero, v.x),
        Vec3W::new(v.y, -v.x, zero),
    )
}

/// `skew(r) * inv_inertia * skew(r)ᵀ`, the angular part of a point constraint's mobility.
pub fn point_mobility(r: Vec3W, inv_inertia: &Mat3W) -> Mat3W {
    let s = skew(r);
    s.mul_mat3(inv_inertia).mul_mat3(&s.transpose())
}

pub fn tangents(n: Vec3W) -> (Vec3W, Vec3W) {
    let zero = FloatW::ZERO;
    let use_xy = n.x.abs().cmp_gt(splat(TANGENT_SWITCH));
    let t = select(
        use_xy,
        Vec3W::new(n.y, -n.x, zero),
        Vec3W::new(zero, n.z, -n.y),
    )
    .noz();
    (t, n.cross(t))
}

pub fn rotate_from_to(from: Vec3W, to: Vec3W) -> QuatW {
    let d = from.dot(to);
    let c = from.cross(to);
    let regular = QuatW::new(c.x, c.y, c.z, FloatW::ONE + d).normalize();
    let (axis, _) = tangents(from);
    let half_turn = QuatW::new(axis.x, axis.y, axis.z, FloatW::ZERO);
    select(d.cmp_lt(splat(-0.999_999)), half_turn, regular)
}

/// Axis and angle per lane, angle in `[0, π]`, zero axis for identity lanes.
pub fn axis_angle(q: QuatW) -> (Vec3W, FloatW) {
    let flip = q.w.cmp_lt(FloatW::ZERO);
    let q = select(flip, QuatW::new(-q.x, -q.y, -q.z, -q.w), q);
    let v = q.vector();
    let s = v.length();
    let angle = splat(2.0) * atan2(s, q.w);
    let axis = select(s.cmp_gt(FloatW::ZERO), v * (FloatW::ONE / s), Vec3W::ZERO);
    (axis, angle)
}

pub fn rotation_error(rotation_a: QuatW, rotation_b: QuatW, initial_inv_rotation_difference: QuatW) -> Vec3W {
    let q = rotation_b * initial_inv_rotation_difference * rotation_a.conjugate();
    let v = q.vector();
    select(q.w.cmp_lt(FloatW::ZERO), -v, v)
}

/// Cramer's rule per lane; singular lanes yield zero.
pub fn solve_mat3(m: &Mat3W, b: Vec3W) -> Vec3W {
    let c12 = m.y_axis.cross(m.z_axis);
    let det = m.x_axis.dot(c12);
    let inv_det = inverse_or_zero(det);
    let x = Vec3W::new(
        b.dot(c12) * inv_det,
        m.x_axis.dot(b.cross(m.z_axis)) * inv_det,
        m.x_axis.dot(m.y_axis.cross(b)) * inv_det,
    );
    select(det.cmp_eq(FloatW::ZERO), Vec3W::ZERO, x)
}

pub fn solve_mat2(m: &Mat2W, b: Vec2W) -> Vec2W {
    let det = m.m00 * m.m11 - m.m01 * m.m10;
    let inv_det = inverse_or_zero(det);
    Vec2W::new(
        (m.m11 * b.x - m.m01 * b.y) * inv_det,
        (m.m00 * b.y - m.m10 * b.x) * inv_det,
    )
}

/// Read-only body data for one batch.
#[derive(Debug, Clone, Copy)]
pub struct BodyLanes {
    pub rotation: QuatW,
    pub local_cog_position: Vec3W,
    pub position: Vec3W,
    pub inv_inertia: Mat3W,
    pub inv_mass: FloatW,
}

impl BodyLanes {
    pub fn gather(bodies: &[RigidBodyState], indices: &[BodyIndex; SIMD_WIDTH]) -> Self {
        let body = |i: usize| &bodies[indices[i] as usize];
        Self {
            rotation: QuatW::gather(|i| body(i).rotation),
            local_cog_position: Vec3W::gather(|i| body(i).local_cog_position),
            position: Vec3W::gather(|i| body(i).position),
            inv_inertia: Mat3W::gather(|i| body(i).inv_inertia),
            inv_mass: gather_f32(|i| body(i).inv_mass),
        }
    }

    /// Anchor offset from the center of gravity, rotated into world space.
    pub fn relative_anchor(&self, local_anchor: Vec3W) -> Vec3W {
        self.rotation.rotate(local_anchor - self.local_cog_position)
    }
}

/// One side of a batch while solving: velocities plus the mass data that scales impulses.
#[derive(Debug, Clone, Copy)]
pub struct SolverBodyW {
    pub linear_velocity: Vec3W,
    pub angular_velocity: Vec3W,
    pub inv_mass: FloatW,
    pub inv_inertia: Mat3W,
}

impl SolverBodyW {
    pub fn gather(bodies: &[RigidBodyState], indices: &[BodyIndex; SIMD_WIDTH]) -> Self {
        let body = |i: usize| &bodies[indices[i] as usize];
        Self {
            linear_velocity: Vec3W::gather(|i| body(i).linear_velocity),
            angular_velocity: Vec3W::gather(|i| body(i).angular_velocity),
            inv_mass: gather_f32(|i| body(i).inv_mass),
            inv_inertia: Mat3W::gather(|i| body(i).inv_inertia),
        }
    }

    /// Write full velocities back. Padding lanes repeat a real lane's body
    /// and carry the identical value, so repeated writes are harmless.
    pub fn scatter(&self, bodies: &mut [RigidBodyState], indices: &[BodyIndex; SIMD_WIDTH]) {
        let linear = self.linear_velocity.to_lanes();
        let angular = self.angular_velocity.to_lanes();
        for (lane, &index) in indices.iter().enumerate() {
            let body = &mut bodies[index as usize];
            body.linear_velocity = linear[lane];
            body.angular_velocity = angular[lane];
        }
    }

    #[inline]
    pub fn point_velocity(&self, r: Vec3W) -> Vec3W {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Apply a linear impulse at lever arm `r`.
    #[inline]
    pub fn apply_impulse(&mut self, impulse: Vec3W, r: Vec3W) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia.mul_vec3(r.cross(impulse));
    }

    #[inline]
    pub fn apply_angular_impulse(&mut self, impulse: Vec3W) {
        self.angular_velocity += self.inv_inertia.mul_vec3(impulse);
    }
}
