//! Backward "rising tide" final-velocity pass.
//!
//! Walks the queue from the tail toward the head, lifting each tangent
//! predecessor's allowable final velocity toward the speed its successor
//! can accept. The walk is bounded by the planner's configured lookahead
//! depth ([`crate::DEFAULT_LOOKAHEAD_DEPTH`] by default) and stops early
//! at a non-tangent boundary, a segment already in progress, or a
//! velocity-limited (peak) segment.

use crate::queue::SegmentQueue;
use crate::state::TermCond;

/// Update final velocities along the tangent chain at the queue tail.
pub(crate) fn run_optimization<const N: usize>(queue: &mut SegmentQueue<N>, lookahead: usize) {
    let len = queue.len();
    if len < 2 {
        return;
    }

    for x in 1..lookahead {
        if x >= len {
            break;
        }
        let ind = len - x;

        // Successor parameters, copied out so the predecessor can be
        // borrowed mutably below.
        let (succ_final, succ_target, succ_accel, succ_maxvel, succ_at_peak) = {
            let tc = match queue.item(ind) {
                Some(tc) => tc,
                None => break,
            };
            (tc.final_vel, tc.target, tc.scaled_accel(), tc.max_vel, tc.at_peak)
        };

        let Some(prev) = queue.item_mut(ind - 1) else {
            break;
        };

        // A non-tangent boundary keeps its final velocity at zero.
        if prev.term_cond != TermCond::Tangent {
            break;
        }

        // Don't touch segments the executor has already started.
        if prev.progress > 0.0 {
            break;
        }

        // Fastest start the successor can absorb while still reaching its
        // own final velocity within its length.
        let vs = (succ_final * succ_final + 2.0 * succ_accel * succ_target).sqrt();
        if vs > succ_maxvel {
            prev.final_vel = succ_maxvel;
            prev.at_peak = true;
        } else {
            prev.final_vel = vs;
            prev.at_peak = false;
        }

        if succ_at_peak {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_LOOKAHEAD_DEPTH;
    use crate::segment::Segment;
    use crate::state::EnableFlags;
    use traj_posemath::{Cart, Pose};

    fn tangent_line(x0: f64, x1: f64, vel: f64) -> Segment {
        let s = Pose::from_triplets(Cart::new(x0, 0.0, 0.0), Cart::zeros(), Cart::zeros());
        let e = Pose::from_triplets(Cart::new(x1, 0.0, 0.0), Cart::zeros(), Cart::zeros());
        let mut tc = Segment::line(0.001, &s, &e, vel, vel, 10.0, EnableFlags::default());
        tc.term_cond = TermCond::Tangent;
        tc
    }

    #[test]
    fn lifts_predecessor_final_velocity() {
        let mut q: SegmentQueue<8> = SegmentQueue::new();
        let mut first = tangent_line(0.0, 1.0, 100.0);
        first.max_vel = 100.0;
        q.push(first).unwrap();
        let mut last = tangent_line(1.0, 2.0, 100.0);
        last.term_cond = TermCond::Stop;
        q.push(last).unwrap();

        run_optimization(&mut q, DEFAULT_LOOKAHEAD_DEPTH);

        // sqrt(0 + 2 * 10 * 1) ~ 4.47, below the 100 ceiling.
        let fv = q.item(0).unwrap().final_vel;
        assert!((fv - 20.0f64.sqrt()).abs() < 1e-9);
        assert!(!q.item(0).unwrap().at_peak);
    }

    #[test]
    fn caps_at_successor_max_vel_and_marks_peak() {
        let mut q: SegmentQueue<8> = SegmentQueue::new();
        q.push(tangent_line(0.0, 10.0, 1.0)).unwrap();
        let mut last = tangent_line(10.0, 20.0, 1.0);
        last.term_cond = TermCond::Stop;
        q.push(last).unwrap();

        run_optimization(&mut q, DEFAULT_LOOKAHEAD_DEPTH);

        let prev = q.item(0).unwrap();
        assert_eq!(prev.final_vel, 1.0);
        assert!(prev.at_peak);
    }

    #[test]
    fn stops_at_non_tangent_boundary() {
        let mut q: SegmentQueue<8> = SegmentQueue::new();
        let mut stop_seg = tangent_line(0.0, 1.0, 1.0);
        stop_seg.term_cond = TermCond::Stop;
        q.push(stop_seg).unwrap();
        q.push(tangent_line(1.0, 2.0, 1.0)).unwrap();

        run_optimization(&mut q, DEFAULT_LOOKAHEAD_DEPTH);
        assert_eq!(q.item(0).unwrap().final_vel, 0.0);
    }

    #[test]
    fn skips_segments_in_progress() {
        let mut q: SegmentQueue<8> = SegmentQueue::new();
        let mut started = tangent_line(0.0, 1.0, 1.0);
        started.progress = 0.5;
        q.push(started).unwrap();
        q.push(tangent_line(1.0, 2.0, 1.0)).unwrap();

        run_optimization(&mut q, DEFAULT_LOOKAHEAD_DEPTH);
        assert_eq!(q.item(0).unwrap().final_vel, 0.0);
    }

    #[test]
    fn walk_is_bounded_by_lookahead_depth() {
        let mut q: SegmentQueue<8> = SegmentQueue::new();
        for i in 0..5 {
            q.push(tangent_line(i as f64, i as f64 + 1.0, 3.0)).unwrap();
        }
        run_optimization(&mut q, 2);

        // Only the immediate predecessor of the tail is lifted.
        assert!(q.item(3).unwrap().final_vel > 0.0);
        for i in 0..3 {
            assert_eq!(q.item(i).unwrap().final_vel, 0.0);
        }
    }

    #[test]
    fn chain_satisfies_rising_tide_bound() {
        let mut q: SegmentQueue<8> = SegmentQueue::new();
        for i in 0..5 {
            q.push(tangent_line(i as f64, i as f64 + 1.0, 3.0)).unwrap();
        }
        run_optimization(&mut q, DEFAULT_LOOKAHEAD_DEPTH);

        for i in 0..4 {
            let prev = q.item(i).unwrap();
            let succ = q.item(i + 1).unwrap();
            let bound =
                (succ.final_vel * succ.final_vel + 2.0 * succ.scaled_accel() * succ.target).sqrt();
            assert!(prev.final_vel <= bound + 1e-9);
            assert!(prev.final_vel <= succ.max_vel + 1e-9);
        }
    }
}
