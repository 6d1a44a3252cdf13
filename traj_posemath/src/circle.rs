//! Circle / helix parameterization.
//!
//! A circle is parameterized by the swept angle. The center is projected
//! into the plane of the start point, so a center supplied slightly off
//! that plane still yields a consistent radius vector; any axial offset of
//! the end point becomes the helical advance.

use std::f64::consts::TAU;

use crate::cart::{CART_FUZZ, Cart, unit};

/// Circular (or helical) arc about a normal axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Cart,
    /// Unit rotation axis.
    pub normal: Cart,
    /// Radius vector at the start point, in the circle plane.
    pub rtan: Cart,
    /// `normal x rtan`; completes the in-plane basis.
    pub rperp: Cart,
    /// Axial advance over the full sweep (zero for a plane arc).
    pub rhelix: Cart,
    /// Circle radius [user units].
    pub radius: f64,
    /// Total swept angle [rad].
    pub angle: f64,
}

impl Circle {
    /// Build an arc from `start` to `end` about `center`/`normal`.
    ///
    /// `turn` adds whole revolutions to the sweep. Returns `None` for a
    /// degenerate axis or radius.
    pub fn new(start: Cart, end: Cart, center: Cart, normal: Cart, turn: u32) -> Option<Self> {
        let n = unit(&normal)?;

        // Project the center into the plane of the start point.
        let v = start - center;
        let center = center + n * n.dot(&v);

        let rtan = start - center;
        let radius = rtan.norm();
        if radius <= CART_FUZZ {
            return None;
        }
        let rperp = n.cross(&rtan);

        let e_rel = end - center;
        let rhelix = n * n.dot(&e_rel);
        let e_plane = e_rel - rhelix;

        let mut angle = if e_plane.norm() <= CART_FUZZ {
            // End point on the axis: no in-plane angle to measure.
            return None;
        } else {
            n.dot(&rtan.cross(&e_plane)).atan2(rtan.dot(&e_plane))
        };
        if angle < 0.0 {
            angle += TAU;
        }
        if angle < 1e-12 {
            // End projects onto the start point: full circle.
            angle = TAU;
        }
        angle += f64::from(turn) * TAU;

        Some(Self {
            center,
            normal: n,
            rtan,
            rperp,
            rhelix,
            radius,
            angle,
        })
    }

    /// Construct the arc of the given radius rounding the corner
    /// `start -> mid -> end`, tangent to both legs.
    ///
    /// Returns `None` when the legs are colinear or degenerate.
    pub fn from_corner(start: Cart, mid: Cart, end: Cart, radius: f64) -> Option<Self> {
        let u1 = unit(&(mid - start))?;
        let u2 = unit(&(end - mid))?;
        let n = unit(&u1.cross(&u2))?;

        // Half of the intersection angle between the legs.
        let dot = u1.dot(&u2).clamp(-1.0, 1.0);
        let theta = (-dot).acos() / 2.0;
        let tan_theta = theta.tan();
        if tan_theta <= CART_FUZZ {
            return None;
        }

        let d = radius / tan_theta;
        let arc_start = mid - u1 * d;
        let arc_end = mid + u2 * d;
        let center_dir = unit(&n.cross(&u1))?;
        let center = arc_start + center_dir * radius;

        Self::new(arc_start, arc_end, center, n, 0)
    }

    /// Point on the arc at swept angle `theta`.
    #[inline]
    pub fn point(&self, theta: f64) -> Cart {
        self.center
            + self.rtan * theta.cos()
            + self.rperp * theta.sin()
            + self.rhelix * (theta / self.angle)
    }

    /// Unit tangent (direction of motion) at swept angle `theta`.
    ///
    /// The helical component is small against the circumferential one and
    /// is left out, matching how segment tangents are compared.
    #[inline]
    pub fn tangent(&self, theta: f64) -> Cart {
        let t = self.rperp * theta.cos() - self.rtan * theta.sin();
        t / self.radius
    }

    /// Magnitude of the helical advance over the full sweep.
    #[inline]
    pub fn helix_mag(&self) -> f64 {
        self.rhelix.norm()
    }
}
