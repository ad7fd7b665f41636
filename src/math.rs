//! Small linear algebra helpers shared by the constraint initializers.
//!
//! Every function here has a lane-wide counterpart in
//! [`physics::wide`](crate::physics::wide); the two must stay numerically in step.

use glam::{Mat2, Mat3, Quat, Vec2, Vec3};

/// Threshold on `|n.x|` above which [`tangents`] builds its first tangent in the XY plane.
pub(crate) const TANGENT_SWITCH: f32 = 0.577_350_26;

/// Cross-product matrix: `skew(v) * x == v.cross(x)`.
#[inline]
pub fn skew(v: Vec3) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(0.0, v.z, -v.y),
        Vec3::new(-v.z, 0.0, v.x),
        Vec3::new(v.y, -v.x, 0.0),
    )
}

/// Two unit vectors `(t, b)` completing `n` to an orthonormal basis, with `b = n × t`.
pub fn tangents(n: Vec3) -> (Vec3, Vec3) {
    let t = if n.x.abs() > TANGENT_SWITCH {
        Vec3::new(n.y, -n.x, 0.0)
    } else {
        Vec3::new(0.0, n.z, -n.y)
    };
    let t = t.normalize_or_zero();
    (t, n.cross(t))
}

/// Normalize, or return zero for a (near) zero vector.
#[inline]
pub fn noz(v: Vec3) -> Vec3 {
    let len = v.length();
    if len > 0.0 {
        v / len
    } else {
        Vec3::ZERO
    }
}

/// Shortest-arc rotation taking unit vector `from` onto unit vector `to`.
pub fn rotate_from_to(from: Vec3, to: Vec3) -> Quat {
    let d = from.dot(to);
    if d < -0.999_999 {
        // Antiparallel: half turn about any axis perpendicular to `from`.
        let (axis, _) = tangents(from);
        return Quat::from_xyzw(axis.x, axis.y, axis.z, 0.0);
    }
    let c = from.cross(to);
    Quat::from_xyzw(c.x, c.y, c.z, 1.0 + d).normalize()
}

/// Axis and angle of `q`, with the angle in `[0, π]`.
///
/// The axis is zero for the identity rotation.
pub fn axis_angle(q: Quat) -> (Vec3, f32) {
    let q = if q.w < 0.0 { -q } else { q };
    let v = Vec3::new(q.x, q.y, q.z);
    let s = v.length();
    let angle = 2.0 * s.atan2(q.w);
    let axis = if s > 0.0 { v / s } else { Vec3::ZERO };
    (axis, angle)
}

/// Vector part of the rotation error `q_b * inv_diff * conj(q_a)`, flipped onto the short arc.
pub fn rotation_error(rotation_a: Quat, rotation_b: Quat, initial_inv_rotation_difference: Quat) -> Vec3 {
    let q = rotation_b * initial_inv_rotation_difference * rotation_a.conjugate();
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
    Vec3::new(q.x, q.y, q.z) * sign
}

/// Solve `m * x = b` by Cramer's rule. A singular system yields zero.
pub fn solve_mat3(m: &Mat3, b: Vec3) -> Vec3 {
    let c12 = m.y_axis.cross(m.z_axis);
    let det = m.x_axis.dot(c12);
    if det == 0.0 {
        return Vec3::ZERO;
    }
    let inv_det = 1.0 / det;
    Vec3::new(
        b.dot(c12) * inv_det,
        m.x_axis.dot(b.cross(m.z_axis)) * inv_det,
        m.x_axis.dot(m.y_axis.cross(b)) * inv_det,
    )
}

/// Solve `m * x = b` for a 2x2 system. A singular system yields zero.
pub fn solve_mat2(m: &Mat2, b: Vec2) -> Vec2 {
    let (m00, m10) = (m.x_axis.x, m.x_axis.y);
    let (m01, m11) = (m.y_axis.x, m.y_axis.y);
    let det = m00 * m11 - m01 * m10;
    if det == 0.0 {
        return Vec2::ZERO;
    }
    let inv_det = 1.0 / det;
    Vec2::new(
        (m11 * b.x - m01 * b.y) * inv_det,
        (m00 * b.y - m10 * b.x) * inv_det,
    )
}

/// `1 / x`, or zero when `x` is zero.
#[inline]
pub fn inverse_or_zero(x: f32) -> f32 {
    if x != 0.0 {
        1.0 / x
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_matches_cross() {
        let v = Vec3::new(1.0, -2.0, 3.0);
        let x = Vec3::new(0.5, 4.0, -1.0);
        assert_relative_eq!(skew(v) * x, v.cross(x), epsilon = 1e-6);
    }

    #[test]
    fn test_tangents_orthonormal() {
        for n in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0).normalize(), -Vec3::X] {
            let (t, b) = tangents(n);
            assert_relative_eq!(t.length(), 1.0, epsilon = 1e-6);
            assert_relative_eq!(b.length(), 1.0, epsilon = 1e-6);
            assert!(t.dot(n).abs() < 1e-6, "t not perpendicular for {n}");
            assert!(b.dot(n).abs() < 1e-6, "b not perpendicular for {n}");
            assert!(t.dot(b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rotate_from_to() {
        let q = rotate_from_to(Vec3::X, Vec3::Y);
        assert_relative_eq!(q * Vec3::X, Vec3::Y, epsilon = 1e-6);

        let q = rotate_from_to(Vec3::Z, -Vec3::Z);
        assert_relative_eq!(q * Vec3::Z, -Vec3::Z, epsilon = 1e-6);
    }

    #[test]
    fn test_axis_angle_positive() {
        let q = Quat::from_axis_angle(Vec3::Y, -0.7);
        let (axis, angle) = axis_angle(q);
        assert_relative_eq!(angle, 0.7, epsilon = 1e-5);
        assert_relative_eq!(axis, -Vec3::Y, epsilon = 1e-5);

        let (axis, angle) = axis_angle(Quat::IDENTITY);
        assert_eq!(angle, 0.0);
        assert_eq!(axis, Vec3::ZERO);
    }

    #[test]
    fn test_rotation_error_short_arc() {
        let qa = Quat::IDENTITY;
        let qb = -Quat::from_axis_angle(Vec3::Z, 0.2);
        let err = rotation_error(qa, qb, Quat::IDENTITY);
        assert!(err.z > 0.0, "error should point along +Z: {err}");
    }

    #[test]
    fn test_solve_mat3() {
        let m = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(1.0, 3.0, 1.0),
            Vec3::new(0.0, 1.0, 2.0),
        );
        let x = Vec3::new(1.0, -2.0, 0.5);
        assert_relative_eq!(solve_mat3(&m, m * x), x, epsilon = 1e-5);
        assert_eq!(solve_mat3(&Mat3::ZERO, Vec3::ONE), Vec3::ZERO);
    }

    #[test]
    fn test_solve_mat2() {
        let m = Mat2::from_cols(Vec2::new(2.0, 1.0), Vec2::new(0.5, 3.0));
        let x = Vec2::new(-1.0, 2.0);
        assert_relative_eq!(solve_mat2(&m, m * x), x, epsilon = 1e-5);
        assert_eq!(solve_mat2(&Mat2::ZERO, Vec2::ONE), Vec2::ZERO);
    }
}
