//! Cartesian vector helpers.
//!
//! `Cart` is a plain 3-vector in user units. The free functions here cover
//! the handful of operations the planner needs beyond what `nalgebra`
//! provides directly, with explicit handling of degenerate magnitudes.

use nalgebra::Vector3;

/// Cartesian 3-vector [user units].
pub type Cart = Vector3<f64>;

/// Magnitudes below this are treated as zero.
pub const CART_FUZZ: f64 = 1e-10;

/// Unit vector in the direction of `v`, or `None` for a near-zero vector.
#[inline]
pub fn unit(v: &Cart) -> Option<Cart> {
    let mag = v.norm();
    if mag > CART_FUZZ { Some(v / mag) } else { None }
}

/// Angle [rad] between two unit vectors.
///
/// The dot product of two unit vectors can drift marginally outside
/// `[-1, 1]`; small excursions are clamped, anything larger means the
/// inputs were not unit vectors and the angle is not computable.
#[inline]
pub fn unit_angle(u1: &Cart, u2: &Cart) -> Option<f64> {
    let dot = u1.dot(u2);
    if dot.abs() > 1.0 + 1e-9 {
        return None;
    }
    Some(dot.clamp(-1.0, 1.0).acos())
}
