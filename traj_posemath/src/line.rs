//! Parameterized 3-D line segment.

use crate::cart::{CART_FUZZ, Cart};

/// Line segment parameterized by distance along its unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub start: Cart,
    pub end: Cart,
    /// Unit direction from start to end; x-axis for a zero-length line.
    pub uvec: Cart,
    /// Total magnitude [user units].
    pub tmag: f64,
}

impl Line {
    pub fn new(start: Cart, end: Cart) -> Self {
        let disp = end - start;
        let tmag = disp.norm();
        let uvec = if tmag > CART_FUZZ { disp / tmag } else { Cart::x() };
        Self { start, end, uvec, tmag }
    }

    /// True if the segment has no usable length.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.tmag <= CART_FUZZ
    }

    /// Point at `len` along the line. A zero-length line stays at its start.
    #[inline]
    pub fn point(&self, len: f64) -> Cart {
        if self.is_zero() {
            self.start
        } else {
            self.start + self.uvec * len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_interpolates() {
        let l = Line::new(Cart::new(1.0, 0.0, 0.0), Cart::new(1.0, 4.0, 0.0));
        assert!((l.tmag - 4.0).abs() < 1e-12);
        let p = l.point(1.0);
        assert!((p - Cart::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        let p = l.point(l.tmag);
        assert!((p - l.end).norm() < 1e-12);
    }

    #[test]
    fn zero_line_stays_at_start() {
        let s = Cart::new(2.0, 3.0, 4.0);
        let l = Line::new(s, s);
        assert!(l.is_zero());
        assert_eq!(l.point(0.5), s);
    }
}
