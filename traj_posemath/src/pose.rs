//! 9-axis machine pose.
//!
//! A pose carries the Cartesian tool-tip position plus the ABC rotary and
//! UVW auxiliary axes. The planner treats ABC and UVW as two further
//! orthogonal 3-D subspaces, so the pose can be split into (and rebuilt
//! from) three Cartesian triplets.

use core::ops::{Add, AddAssign, Sub};

use crate::cart::Cart;

/// Commanded machine position across all nine axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Cartesian translation (x, y, z).
    pub tran: Cart,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            tran: Cart::zeros(),
            a: 0.0,
            b: 0.0,
            c: 0.0,
            u: 0.0,
            v: 0.0,
            w: 0.0,
        }
    }
}

impl Pose {
    /// Pose at the machine origin.
    pub const ZERO: Self = Self {
        tran: Cart::new(0.0, 0.0, 0.0),
        a: 0.0,
        b: 0.0,
        c: 0.0,
        u: 0.0,
        v: 0.0,
        w: 0.0,
    };

    /// Build a pose from its xyz / abc / uvw triplets.
    #[inline]
    pub fn from_triplets(xyz: Cart, abc: Cart, uvw: Cart) -> Self {
        Self {
            tran: xyz,
            a: abc.x,
            b: abc.y,
            c: abc.z,
            u: uvw.x,
            v: uvw.y,
            w: uvw.z,
        }
    }

    /// Cartesian translation triplet.
    #[inline]
    pub fn xyz(&self) -> Cart {
        self.tran
    }

    /// Rotary axes as a Cartesian triplet.
    #[inline]
    pub fn abc(&self) -> Cart {
        Cart::new(self.a, self.b, self.c)
    }

    /// Auxiliary axes as a Cartesian triplet.
    #[inline]
    pub fn uvw(&self) -> Cart {
        Cart::new(self.u, self.v, self.w)
    }
}

impl Add for Pose {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            tran: self.tran + rhs.tran,
            a: self.a + rhs.a,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
            u: self.u + rhs.u,
            v: self.v + rhs.v,
            w: self.w + rhs.w,
        }
    }
}

impl AddAssign for Pose {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Pose {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            tran: self.tran - rhs.tran,
            a: self.a - rhs.a,
            b: self.b - rhs.b,
            c: self.c - rhs.c,
            u: self.u - rhs.u,
            v: self.v - rhs.v,
            w: self.w - rhs.w,
        }
    }
}
