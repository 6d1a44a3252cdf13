//! Corner blending between queued segments.
//!
//! When a new line arrives behind another line, three outcomes are
//! possible: the corner is effectively straight and the pair is marked
//! tangent; a tangent arc can round the corner faster than a parabolic
//! overlap could take it, so one is inserted and both lines are trimmed to
//! its shoulders; or neither applies and the pair falls back to the
//! parabolic overlap (or an exact stop) at execution time.
//!
//! Every numeric degeneracy in here is a fallback, not an error: the
//! planner silently keeps the parabolic behavior it already had.

use std::f64::consts::PI;

use tracing::debug;

use crate::executor::{FeedState, effective_req_vel};
use crate::segment::{Segment, SegmentGeometry};
use crate::state::TermCond;
use crate::sync_io::SyncIo;
use crate::{ACCEL_EPSILON, ANGLE_EPSILON, MAG_EPSILON};
use traj_posemath::Circle;

/// Outcome of examining a line/line corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlendDecision {
    /// Insert a tangent arc between the two lines.
    Arc,
    /// The corner is straight enough to hand off tangentially as-is.
    Tangent,
    /// Leave the pair to parabolic blending or an exact stop.
    NoBlend,
}

/// Decide whether the corner between `prev` and the incoming `tc` can be
/// handed off tangentially or rounded with an arc.
pub(crate) fn check_need_arc(prev: &Segment, tc: &Segment) -> BlendDecision {
    let (SegmentGeometry::Line(pl), SegmentGeometry::Line(cl)) = (&prev.geometry, &tc.geometry)
    else {
        return BlendDecision::NoBlend;
    };

    if pl.xyz.is_zero() || cl.xyz.is_zero() {
        return BlendDecision::NoBlend;
    }

    // Only a parabolic boundary may be upgraded; an exact stop stays one.
    if prev.term_cond != TermCond::Parabolic {
        return BlendDecision::NoBlend;
    }

    // Blending is strictly an xyz affair.
    if pl.abc.tmag > MAG_EPSILON || cl.abc.tmag > MAG_EPSILON {
        return BlendDecision::NoBlend;
    }
    if pl.uvw.tmag > MAG_EPSILON || cl.uvw.tmag > MAG_EPSILON {
        return BlendDecision::NoBlend;
    }

    let Some(omega) = traj_posemath::unit_angle(&pl.xyz.uvec, &cl.xyz.uvec) else {
        return BlendDecision::NoBlend;
    };

    // A kink smaller than the critical angle is tangent within the
    // acceleration budget; nothing to construct.
    if omega < ANGLE_EPSILON {
        return BlendDecision::Tangent;
    }

    // Near-reversal corners have no usable arc radius.
    if PI - omega < ANGLE_EPSILON {
        debug!(omega, "corner too tight to blend");
        return BlendDecision::NoBlend;
    }

    BlendDecision::Arc
}

/// Safe velocity for the parabolic overlap between `tc` and its successor.
///
/// Each segment can reach `sqrt(target * accel)` from rest over its own
/// length; the overlap must respect both, the successor's requested
/// velocity, and (when a tolerance is set) the corner-deviation bound.
pub(crate) fn compute_blend_velocity(
    tc: &Segment,
    nexttc: Option<&Segment>,
    feed: &FeedState,
) -> f64 {
    let Some(next) = nexttc else {
        return 0.0;
    };

    let acc_this = tc.scaled_accel();
    let acc_next = next.scaled_accel();
    if acc_next <= 0.0 {
        return 0.0;
    }

    let v_peak_this = (tc.target * acc_this).sqrt();
    let v_peak_next = (next.target * acc_next).sqrt();
    let mut blend_vel = v_peak_this.min(v_peak_next);

    // The successor has a cruise phase: blend over its whole accel period.
    let next_req = effective_req_vel(next, feed);
    if blend_vel > next_req {
        blend_vel = next_req;
    }
    if acc_this < acc_next {
        blend_vel *= acc_this / acc_next;
    }

    if tc.tolerance > 0.0 {
        // Bound the velocity so that, decelerating to a stop from it, the
        // path passes no farther than the tolerance from the corner.
        let dot = tc.ending_tangent().dot(&next.starting_tangent());
        let theta = (-dot.clamp(-1.0, 1.0)).acos() / 2.0;
        if theta.cos() > 0.001 {
            let tblend_vel = 2.0 * (acc_this * tc.tolerance / theta.cos()).sqrt();
            if tblend_vel < blend_vel {
                blend_vel = tblend_vel;
            }
        }
    }

    blend_vel
}

/// Compute the tangent arc between two lines, if one is worth having.
///
/// Returns the fully parameterized arc segment; the caller still has to
/// connect it (trim the neighbors) and queue it. `None` means arc
/// blending loses to the parabolic overlap or the geometry is degenerate.
pub(crate) fn create_blend_arc(
    cycle_time: f64,
    feed: &FeedState,
    prev: &Segment,
    tc: &Segment,
    staging: &mut SyncIo,
) -> Option<Segment> {
    let (SegmentGeometry::Line(pl), SegmentGeometry::Line(cl)) = (&prev.geometry, &tc.geometry)
    else {
        return None;
    };

    // Half of the intersection angle between the legs.
    let dot = pl.xyz.uvec.dot(&cl.xyz.uvec);
    if dot.abs() > 1.0 + 1e-9 {
        return None;
    }
    let theta = (-dot.clamp(-1.0, 1.0)).acos() / 2.0;

    let v_req = prev.req_vel.max(tc.req_vel);
    let a_max = prev.max_accel.min(tc.max_accel);

    // Reserve acceleration equally for the tangential and normal
    // directions on the arc, with margin for the segment-length
    // compromise below.
    let acc_safety = 0.98;
    let a_n_max = a_max / 2f64.sqrt() * acc_safety;
    if a_n_max <= ACCEL_EPSILON {
        return None;
    }

    let start = pl.xyz.start;
    let middle = pl.xyz.end;
    let end = cl.xyz.end;

    // Minimum tolerance across the pair; zero means unconstrained.
    let t1 = if prev.tolerance == 0.0 { 1e7 } else { prev.tolerance };
    let t2 = if tc.tolerance == 0.0 { 1e7 } else { tc.tolerance };
    let tolerance = t1.min(t2);

    let ctheta = theta.cos();
    let stheta = theta.sin();
    let ttheta = theta.tan();

    let tmp = 1.0 - stheta;
    if tmp <= ANGLE_EPSILON {
        debug!(theta, "tolerance height singular");
        return None;
    }
    let d_tol = ctheta * tolerance / tmp;

    // Consume at most the whole previous segment and half of the next.
    let l1 = prev.target;
    let l2 = tc.target;
    let d_prev = l1;
    let d_next = l2 * 0.5;

    let d_geom = d_prev.min(d_next).min(d_tol);
    let r_geom = ttheta * d_geom;

    // Velocity cap from normal acceleration on the geometric radius, then
    // shrink the radius to what that velocity actually needs.
    let v_normal = (a_n_max * r_geom).sqrt();
    let mut v_upper = v_req.min(v_normal);
    let r_normal = v_upper * v_upper / a_n_max;
    let mut r_upper = r_normal.min(r_geom);
    let mut d_upper = r_upper / ttheta;

    // Sweep angle of the arc.
    let phi = PI - theta * 2.0;

    let l_prev = l1 - d_upper;
    if l_prev < -MAG_EPSILON {
        debug!(l_prev, "negative remainder on predecessor");
        return None;
    }
    if l_prev < MAG_EPSILON {
        // Absorb the predecessor fully rather than leave a sliver.
        d_upper += l_prev;
    } else {
        // Short-segment compromise: the blend velocity is also limited by
        // how far the arc advances in one sample, and by how fast the
        // shortened predecessor can be crossed.
        let v_sample = phi * d_upper * ttheta / cycle_time;
        v_upper = v_upper.min(v_sample);

        let d_sample = v_upper * cycle_time / (phi * ttheta);
        let v1_sample = (l1 - d_sample) / cycle_time;
        if v1_sample < v_upper {
            d_upper = l1 / (1.0 + phi * ttheta);
            v_upper = v1_sample;
        }
    }
    r_upper = d_upper * ttheta;

    // If the parabolic overlap would carry the corner at least as fast,
    // the arc buys nothing.
    let v_parabolic = compute_blend_velocity(prev, Some(tc), feed);
    if v_upper < v_parabolic {
        debug!(v_upper, v_parabolic, "parabolic blend is faster, skipping arc");
        return None;
    }

    if r_upper < MAG_EPSILON {
        debug!(r_upper, "blend radius too small");
        return None;
    }

    let circle = Circle::from_corner(start, middle, end, r_upper)?;
    let mut blend = Segment::blend_arc(cycle_time, prev, circle, v_upper, a_max)?;
    blend.consume_staged_io(staging);

    debug!(
        radius = r_upper,
        vel = v_upper,
        sweep = phi,
        "inserting tangent blend arc"
    );
    Some(blend)
}

/// Trim the neighboring lines to the arc's shoulders.
///
/// Returns true when the predecessor was consumed down to nothing and
/// should be removed from the queue.
pub(crate) fn connect_blend_arc(prev: &mut Segment, tc: &mut Segment, blend: &Segment) -> bool {
    let SegmentGeometry::Circular(bc) = &blend.geometry else {
        return false;
    };
    let arc_start = bc.xyz.point(0.0);
    let arc_end = bc.xyz.point(bc.xyz.angle);

    if let SegmentGeometry::Line(pl) = &mut prev.geometry {
        pl.xyz = traj_posemath::Line::new(pl.xyz.start, arc_start);
        prev.target = pl.xyz.tmag;
    }
    if let SegmentGeometry::Line(cl) = &mut tc.geometry {
        cl.xyz = traj_posemath::Line::new(arc_end, cl.xyz.end);
        tc.target = cl.xyz.tmag;
    }
    prev.term_cond = TermCond::Tangent;

    prev.target < 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EnableFlags;
    use traj_posemath::{Cart, Pose};

    fn line(start: (f64, f64), end: (f64, f64), vel: f64) -> Segment {
        let s = Pose::from_triplets(Cart::new(start.0, start.1, 0.0), Cart::zeros(), Cart::zeros());
        let e = Pose::from_triplets(Cart::new(end.0, end.1, 0.0), Cart::zeros(), Cart::zeros());
        let mut tc = Segment::line(0.001, &s, &e, vel, vel, 10.0, EnableFlags::default());
        tc.term_cond = TermCond::Parabolic;
        tc
    }

    fn feed() -> FeedState {
        FeedState {
            scale: 1.0,
            pausing: false,
            aborting: false,
        }
    }

    #[test]
    fn colinear_lines_are_tangent() {
        let prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        let tc = line((1.0, 0.0), (2.0, 0.0), 1.0);
        assert_eq!(check_need_arc(&prev, &tc), BlendDecision::Tangent);
    }

    #[test]
    fn reversal_cannot_blend() {
        let prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        let tc = line((1.0, 0.0), (0.0, 0.0), 1.0);
        assert_eq!(check_need_arc(&prev, &tc), BlendDecision::NoBlend);
    }

    #[test]
    fn right_angle_is_an_arc_candidate() {
        let prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        let tc = line((1.0, 0.0), (1.0, 1.0), 1.0);
        assert_eq!(check_need_arc(&prev, &tc), BlendDecision::Arc);
    }

    #[test]
    fn stop_term_cond_blocks_arc() {
        let mut prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        prev.term_cond = TermCond::Stop;
        let tc = line((1.0, 0.0), (1.0, 1.0), 1.0);
        assert_eq!(check_need_arc(&prev, &tc), BlendDecision::NoBlend);
    }

    #[test]
    fn rotary_motion_blocks_arc() {
        let s = Pose::ZERO;
        let e = Pose {
            a: 10.0,
            ..Pose::from_triplets(Cart::new(1.0, 0.0, 0.0), Cart::zeros(), Cart::zeros())
        };
        let mut prev = Segment::line(0.001, &s, &e, 1.0, 1.0, 10.0, EnableFlags::default());
        prev.term_cond = TermCond::Parabolic;
        let tc = line((1.0, 0.0), (1.0, 1.0), 1.0);
        assert_eq!(check_need_arc(&prev, &tc), BlendDecision::NoBlend);
    }

    #[test]
    fn blend_velocity_clamped_by_successor_request() {
        let prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        let tc = line((1.0, 0.0), (1.0, 1.0), 1.0);
        let v = compute_blend_velocity(&prev, Some(&tc), &feed());
        // Peaks are sqrt(1 * 10) ~ 3.16 but the successor only asks for 1.
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blend_velocity_zero_without_successor() {
        let prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        assert_eq!(compute_blend_velocity(&prev, None, &feed()), 0.0);
    }

    #[test]
    fn tolerance_bounds_blend_velocity() {
        let mut prev = line((0.0, 0.0), (10.0, 0.0), 8.0);
        prev.tolerance = 0.01;
        let tc = line((10.0, 0.0), (10.0, 10.0), 8.0);
        let v = compute_blend_velocity(&prev, Some(&tc), &feed());
        let expected = 2.0 * (10.0f64 * 0.01 / std::f64::consts::FRAC_PI_4.cos()).sqrt();
        assert!(v <= expected + 1e-9);
    }

    #[test]
    fn slow_right_angle_gets_an_arc() {
        // Long legs at modest speed: the tangent arc matches the parabolic
        // velocity and wins the comparison.
        let mut prev = line((0.0, 0.0), (2.0, 0.0), 0.5);
        prev.tolerance = 0.05;
        let mut tc = line((2.0, 0.0), (2.0, 2.0), 0.5);
        tc.tolerance = 0.05;

        let mut staging = SyncIo::default();
        let blend = create_blend_arc(0.001, &feed(), &prev, &tc, &mut staging);
        let blend = blend.expect("arc should be created");

        assert_eq!(blend.term_cond, TermCond::Tangent);
        assert!((blend.accel_scale - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!(blend.req_vel > 0.0);

        let removable = connect_blend_arc(&mut prev, &mut tc, &blend);
        assert!(!removable);
        // Both lines shortened; tangency at the shoulders.
        assert!(prev.target < 2.0);
        assert!(tc.target < 2.0);
        assert!((prev.ending_tangent() - blend.starting_tangent()).norm() < 1e-9);
        assert!((blend.ending_tangent() - tc.starting_tangent()).norm() < 1e-9);
    }

    #[test]
    fn fast_tight_corner_falls_back_to_parabolic() {
        // Requested velocity well above what the tolerance-bounded radius
        // supports: the parabolic overlap is faster.
        let mut prev = line((0.0, 0.0), (1.0, 0.0), 1.0);
        prev.tolerance = 0.05;
        let mut tc = line((1.0, 0.0), (1.0, 1.0), 1.0);
        tc.tolerance = 0.05;

        let mut staging = SyncIo::default();
        assert!(create_blend_arc(0.001, &feed(), &prev, &tc, &mut staging).is_none());
    }
}
