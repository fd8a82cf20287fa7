//! Interpolation helpers:
//! - lerp_f32
//! - quaternion normalize, NLERP and SLERP with shortest-arc correction
//! - ease_in_out_quad (cross-fade curve)

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

/// Normalize a quaternion; a zero-length input yields identity.
#[inline]
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let len2 = dot4(q, q);
    if len2 > 0.0 && len2.is_finite() {
        let inv_len = len2.sqrt().recip();
        [q[0] * inv_len, q[1] * inv_len, q[2] * inv_len, q[3] * inv_len]
    } else {
        [0.0, 0.0, 0.0, 1.0]
    }
}

/// Quaternion NLERP with shortest-arc correction.
/// If dot < 0, negate the second quaternion to ensure the shortest path.
#[inline]
pub fn nlerp_quat(a: [f32; 4], mut b: [f32; 4], t: f32) -> [f32; 4] {
    if dot4(a, b) < 0.0 {
        b = [-b[0], -b[1], -b[2], -b[3]];
    }
    normalize_quat([
        lerp_f32(a[0], b[0], t),
        lerp_f32(a[1], b[1], t),
        lerp_f32(a[2], b[2], t),
        lerp_f32(a[3], b[3], t),
    ])
}

/// Spherical interpolation between two quaternions along the shortest arc.
pub fn slerp_quat(q1: [f32; 4], q2: [f32; 4], t: f32) -> [f32; 4] {
    let qa = normalize_quat(q1);
    let mut qb = normalize_quat(q2);

    let mut dot = dot4(qa, qb);
    if dot < 0.0 {
        qb = [-qb[0], -qb[1], -qb[2], -qb[3]];
        dot = -dot;
    }

    // Nearly parallel: sin(theta) underflows, fall back to NLERP.
    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return nlerp_quat(qa, qb, t);
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    [
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ]
}

/// Quadratic ease-in/ease-out on `[0, 1]`; inputs outside are clamped.
#[inline]
pub fn ease_in_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        let u = -2.0 * t + 2.0;
        1.0 - u * u / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ease_hits_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_quad(0.0), 0.0);
        assert_eq!(ease_in_out_quad(1.0), 1.0);
        assert_abs_diff_eq!(ease_in_out_quad(0.5), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(ease_in_out_quad(0.25), 0.125, epsilon = 1e-6);
        assert_eq!(ease_in_out_quad(4.0), 1.0);
    }

    #[test]
    fn normalize_zero_is_identity() {
        assert_eq!(normalize_quat([0.0; 4]), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.0, 0.0, -1.0];
        let q = slerp_quat(a, b, 0.5);
        assert_abs_diff_eq!(q[3].abs(), 1.0, epsilon = 1e-6);
    }
}
