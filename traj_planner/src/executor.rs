//! The per-cycle executor.
//!
//! [`TrajectoryPlanner::run_cycle`] is called exactly once per control
//! period. It activates, advances and completes the head of the segment
//! queue, overlaps it with its successor while blending, and commits the
//! resulting displacement to the planner's commanded position. Nothing in
//! here allocates or blocks; waits (spindle at-speed, index latch, rotary
//! unlock) are polled and simply end the cycle early.

use tracing::{debug, warn};
use traj_posemath::Line;

use crate::blend::compute_blend_velocity;
use crate::planner::TrajectoryPlanner;
use crate::segment::{Segment, SegmentGeometry};
use crate::spindle::{SpindleInterface, SpindleTracking, sync_position_mode, sync_velocity_mode};
use crate::state::{MotionClass, SyncMode, TapState, TermCond};
use crate::status::{MotionIo, MotionStatus};
use traj_posemath::Pose;

// ─── Feed override ──────────────────────────────────────────────────

/// Feed-override inputs for one cycle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FeedState {
    /// Net feed scale supplied by the host.
    pub scale: f64,
    pub pausing: bool,
    pub aborting: bool,
}

/// Effective feed override factor for a segment.
///
/// Traverse and position-synced moves run at programmed speed; pausing or
/// aborting forces the override to zero so motion plans down to a stop.
pub(crate) fn feed_override(tc: &Segment, feed: &FeedState) -> f64 {
    if tc.motion_class == MotionClass::Traverse || tc.synchronized == SyncMode::Position {
        1.0
    } else if feed.pausing || feed.aborting {
        0.0
    } else {
        feed.scale
    }
}

#[inline]
pub(crate) fn effective_req_vel(tc: &Segment, feed: &FeedState) -> f64 {
    tc.req_vel * feed_override(tc, feed)
}

#[inline]
pub(crate) fn effective_final_vel(tc: &Segment, feed: &FeedState) -> f64 {
    tc.final_vel * feed_override(tc, feed)
}

#[inline]
fn saturate(x: f64, max: f64) -> f64 {
    x.clamp(-max, max)
}

// ─── Trapezoidal integrator ─────────────────────────────────────────

/// Advance one segment by one cycle.
///
/// Solves for the unique velocity that, integrated over one more period,
/// keeps the segment on a feasible deceleration ramp to its final
/// velocity at the target. Returns the commanded velocity and whether the
/// segment is on that final ramp.
pub(crate) fn segment_run_cycle(tc: &mut Segment, feed: &FeedState, v_limit: f64) -> (f64, bool) {
    let mut req_vel = effective_req_vel(tc, feed);
    let mut final_vel = effective_final_vel(tc, feed);

    if req_vel > tc.max_vel {
        req_vel = tc.max_vel;
    }
    if final_vel > req_vel {
        final_vel = req_vel;
    }
    // Pausing plans down to zero regardless of the optimizer's answer.
    if feed.pausing {
        final_vel = 0.0;
    }

    // Freeze the blend reference once the final deceleration begins; the
    // parabolic overlap complements against this value.
    if !tc.blending && !tc.on_final_decel {
        tc.vel_at_blend_start = tc.current_vel;
    }

    let delta_pos = tc.target - tc.progress;
    let max_accel = tc.scaled_accel();

    let discr = final_vel * final_vel
        + max_accel * (2.0 * delta_pos - tc.current_vel * tc.cycle_time)
        + (max_accel * tc.cycle_time / 2.0).powi(2);

    // A negative discriminant means we have overshot (or are about to);
    // drop to zero velocity and let the clamp below resolve it.
    let max_new_vel = if discr < 0.0 {
        0.0
    } else {
        -0.5 * max_accel * tc.cycle_time + discr.sqrt()
    };
    let mut new_vel = max_new_vel;

    if new_vel > req_vel {
        new_vel = req_vel;
    }

    if new_vel < 0.0 {
        new_vel = 0.0;
        // Throw out any residual to force an exact stop, except at a
        // tangent handoff where the overshoot (and its velocity) carries
        // into the successor.
        if tc.term_cond != TermCond::Tangent || tc.progress < tc.target {
            tc.progress = tc.target;
            tc.current_vel = 0.0;
        }
    } else {
        // Clamp the tool-tip velocity unless the motion is purely rotary
        // (angular units) or slaved to spindle position.
        if !tc.is_pure_rotary() && tc.synchronized != SyncMode::Position && new_vel > v_limit {
            new_vel = v_limit;
        }

        let new_accel = saturate((new_vel - tc.current_vel) / tc.cycle_time, max_accel);
        new_vel = tc.current_vel + new_accel * tc.cycle_time;

        // Trapezoidal integration; progress may step past the target here
        // and is resolved by the caller.
        tc.progress += (new_vel + tc.current_vel) * 0.5 * tc.cycle_time;
        tc.current_vel = new_vel;
    }

    let on_final_decel = (max_new_vel - new_vel).abs() < 0.001;
    tc.on_final_decel = on_final_decel;
    (new_vel, on_final_decel)
}

// ─── Cycle helpers ──────────────────────────────────────────────────

/// Carry tangent-handoff overshoot into the successor.
///
/// Arc-length parameterization means a segment ending at speed usually
/// steps slightly past its target; seeding the successor's progress and
/// velocity with the excess keeps the path C1-continuous.
fn check_overshoot(tc: &mut Segment, nexttc: Option<&mut Segment>) {
    if tc.progress <= tc.target {
        return;
    }
    let overshoot = tc.progress - tc.target;
    match nexttc {
        Some(next) => {
            next.progress = overshoot;
            if overshoot > next.target {
                // An overshoot this large means planning upstream went
                // wrong; clamp rather than corrupt the successor.
                warn!(
                    overshoot,
                    next_target = next.target,
                    "overshoot past successor, clamping"
                );
                next.progress = next.target;
            }
            next.current_vel = tc.current_vel;
            tc.progress = tc.target;
        }
        None => {
            tc.progress = tc.target;
        }
    }
}

/// Run the successor's share of a parabolic overlap.
///
/// The successor is driven at the complement of the primary velocity, so
/// the two contributions sum toward the velocity the primary had when its
/// final deceleration began.
fn do_parabolic_blend(
    tc: &Segment,
    nexttc: &mut Segment,
    primary_vel: f64,
    feed: &FeedState,
    v_limit: f64,
) {
    let save_vel = nexttc.req_vel;
    let ov = feed_override(nexttc, feed);
    nexttc.req_vel = if ov > 0.0 {
        (tc.vel_at_blend_start - primary_vel) / ov
    } else {
        0.0
    };
    segment_run_cycle(nexttc, feed, v_limit);
    nexttc.req_vel = save_vel;
}

/// Advance the rigid-tap state machine for the head segment.
///
/// Reversal detection compares successive signed spindle positions and
/// requires `debounce` consecutive monotonic samples (the planner's
/// configured count, [`crate::DEFAULT_REVERSAL_DEBOUNCE`] by default),
/// so a single jittery encoder reading cannot fake a turnaround.
pub(crate) fn handle_rigid_tap(
    tc: &mut Segment,
    spindle: &mut SpindleInterface,
    track: &SpindleTracking,
    debounce: u8,
) {
    let SegmentGeometry::RigidTap(mut rt) = tc.geometry else {
        return;
    };

    let new_pos = spindle.signed_position();

    match rt.state {
        TapState::Tapping => {
            if tc.progress >= rt.reversal_target {
                debug!(progress = tc.progress, "tap depth reached, reversing spindle");
                spindle.speed_cmd = -spindle.speed_cmd;
                rt.state = TapState::Reversing;
                rt.reversal_samples = 0;
            }
        }
        TapState::Reversing => {
            if new_pos < rt.last_spindle_pos {
                rt.reversal_samples += 1;
            } else {
                rt.reversal_samples = 0;
            }
            if rt.reversal_samples >= debounce {
                // The spindle has actually turned around: aim back at the
                // start point from wherever the axis is now.
                let start = rt.xyz.point(tc.progress);
                let end = rt.xyz.start;
                rt.aux_xyz = Line::new(start, end);
                rt.spindle_revs_at_reversal = new_pos + track.offset;
                rt.reversal_target = rt.aux_xyz.tmag;
                tc.target = rt.aux_xyz.tmag + 10.0 * tc.uu_per_rev;
                tc.progress = 0.0;
                rt.state = TapState::Retraction;
                rt.reversal_samples = 0;
                debug!(target = tc.target, "retracting");
            }
        }
        TapState::Retraction => {
            if tc.progress >= rt.reversal_target {
                spindle.speed_cmd = -spindle.speed_cmd;
                rt.state = TapState::FinalReversal;
                rt.reversal_samples = 0;
            }
        }
        TapState::FinalReversal => {
            if new_pos > rt.last_spindle_pos {
                rt.reversal_samples += 1;
            } else {
                rt.reversal_samples = 0;
            }
            if rt.reversal_samples >= debounce {
                let start = rt.aux_xyz.point(tc.progress);
                let end = rt.xyz.start;
                rt.aux_xyz = Line::new(start, end);
                tc.target = rt.aux_xyz.tmag;
                tc.progress = 0.0;
                // The spindle no longer drives this move; finish as an
                // ordinary positioning segment.
                tc.synchronized = SyncMode::None;
                tc.req_vel = tc.max_vel;
                rt.state = TapState::FinalPlacement;
                rt.reversal_samples = 0;
                debug!(target = tc.target, "final placement");
            }
        }
        TapState::FinalPlacement => {}
    }

    rt.last_spindle_pos = new_pos;
    tc.geometry = SegmentGeometry::RigidTap(rt);
}

/// Publish the reported segment's progress into the motion status.
fn update_movement_status(status: &mut MotionStatus, current_pos: &Pose, tc: &Segment) {
    let target = tc.endpoint();
    status.motion_class = tc.motion_class;
    status.distance_to_go = tc.distance_to_go();
    status.enables_queued = tc.enables;
    status.exec_id = tc.id;
    status.requested_vel = tc.req_vel;
    status.current_vel = tc.current_vel;
    status.dtg = target - *current_pos;
}

// ─── The cycle ──────────────────────────────────────────────────────

impl<const N: usize> TrajectoryPlanner<N> {
    /// Advance the planner by one control period.
    ///
    /// Reads the queue head, integrates it (and its successor while
    /// blending), and commits the resulting displacement to the
    /// commanded position. Total for any planner state; waits and an
    /// empty queue simply end the cycle early.
    pub fn run_cycle(&mut self, io: &mut dyn MotionIo) {
        self.status.queue_len = self.queue.len();
        self.status.requested_vel = 0.0;

        let Some(head) = self.queue.item(0) else {
            self.handle_empty_queue();
            return;
        };

        // Completed head: pop it unless a wait still pins it.
        let (head_target, head_progress, head_id) = (head.target, head.progress, head.id);
        if head_target == head_progress && self.spindle_track.waiting_for_atspeed != Some(head_id)
        {
            if !self.complete_segment(io) {
                return;
            }
        }

        let use_next = self.next_eligible();

        if self.aborting && self.try_finish_abort(use_next) {
            return;
        }

        if self.check_waiting() {
            return;
        }

        // First touch of the head segment.
        if !self.queue.item(0).unwrap().active && !self.activate_head(io) {
            return;
        }

        // Index-latch handshake: once the encoder clears the request, the
        // move is locked to the spindle's angular position.
        if self.spindle_track.waiting_for_index.is_some() {
            if self.spindle.index_enable {
                return;
            }
            debug!("spindle index latched, motion is position-synced");
            self.status.spindle_sync = true;
            self.spindle_track.waiting_for_index = None;
            self.spindle_track.revs = 0.0;
            self.queue.item_mut(0).unwrap().sync_accel = 1;
        }

        handle_rigid_tap(
            self.queue.item_mut(0).unwrap(),
            &mut self.spindle,
            &self.spindle_track,
            self.reversal_debounce,
        );

        if self.queue.item(0).unwrap().synchronized == SyncMode::None {
            self.status.spindle_sync = false;
        }

        // First touch of the successor once it is eligible to overlap.
        if use_next {
            let (head, next) = self.queue.first_two_mut();
            let head = head.unwrap();
            if let Some(next) = next {
                if !next.active {
                    debug!(id = next.id, "activating successor");
                    next.current_vel = 0.0;
                    next.active = true;
                    next.blending = false;
                    // Reserve acceleration on both sides of a parabolic
                    // boundary.
                    if head.term_cond == TermCond::Parabolic
                        || next.term_cond == TermCond::Parabolic
                    {
                        next.accel_scale = 0.5;
                    }
                }
            }
        }

        // Spindle synchronization rewrites the requested velocity.
        let next_progress = if use_next {
            self.queue.item(1).map(|tc| tc.progress).unwrap_or(0.0)
        } else {
            0.0
        };
        match self.queue.item(0).unwrap().synchronized {
            SyncMode::None => {}
            SyncMode::Velocity => {
                sync_velocity_mode(self.queue.item_mut(0).unwrap(), next_progress, &self.spindle);
            }
            SyncMode::Position => {
                sync_position_mode(
                    self.queue.item_mut(0).unwrap(),
                    next_progress,
                    &self.spindle,
                    &mut self.spindle_track,
                );
            }
        }

        let feed = self.feed_state();
        let v_limit = self.v_limit;

        // The rest of the cycle works on the head/successor pair.
        let (head, next) = self.queue.first_two_mut();
        let head = head.unwrap();
        let mut next = if use_next { next } else { None };

        // A synchronized successor tracks the head's request.
        if let Some(next) = next.as_deref_mut() {
            if next.synchronized != SyncMode::None {
                next.req_vel = head.req_vel;
            }
        }

        if head.term_cond == TermCond::Parabolic {
            let blend_vel = compute_blend_velocity(&*head, next.as_deref(), &feed);
            head.blend_vel = blend_vel;
        }

        let primary_before = head.pos();
        let (primary_vel, on_final_decel) = segment_run_cycle(head, &feed, v_limit);

        // Tangent handoff: capture the successor's pose before seeding it
        // with the overshoot, then transfer.
        let secondary_before = if head.term_cond == TermCond::Tangent {
            next.as_deref().map(|n| n.pos())
        } else {
            None
        };
        if head.term_cond == TermCond::Tangent {
            check_overshoot(head, next.as_deref_mut());
        }

        let primary_disp = head.pos() - primary_before;
        self.current_pos += primary_disp;

        let is_blend_start = head.term_cond == TermCond::Parabolic
            && next.is_some()
            && on_final_decel
            && primary_vel < head.blend_vel;
        let is_tangent_blend_start = head.term_cond == TermCond::Tangent
            && next.is_some()
            && head.target == head.progress;

        if is_blend_start {
            head.blending = true;
        }

        if head.blending && next.is_some() {
            let next = next.as_deref_mut().unwrap();

            let before = next.pos();
            do_parabolic_blend(head, next, primary_vel, &feed, v_limit);
            self.current_pos += next.pos() - before;

            // Report the faster of the two overlapping segments; its
            // synced I/O fires when it leads.
            if head.current_vel > next.current_vel {
                update_movement_status(&mut self.status, &self.current_pos, head);
            } else {
                next.sync_io.dispatch(io);
                update_movement_status(&mut self.status, &self.current_pos, next);
            }
            self.status.current_vel = head.current_vel + next.current_vel;
            self.active_depth = 2;
        } else {
            if is_tangent_blend_start {
                debug!(id = head.id, "tangent handoff");
                if let (Some(next), Some(before)) = (next.as_deref_mut(), secondary_before) {
                    self.current_pos += next.pos() - before;
                }
            }
            head.sync_io.dispatch(io);
            update_movement_status(&mut self.status, &self.current_pos, head);
            self.active_depth = 1;
        }
    }

    /// Reset to an idle state when the queue runs dry.
    fn handle_empty_queue(&mut self) {
        self.queue.clear();
        self.goal_pos = self.current_pos;
        self.done = true;
        self.active_depth = 0;
        self.aborting = false;
        self.status.exec_id = 0;
        self.status.motion_class = MotionClass::None;
        self.status.current_vel = 0.0;
        self.status.distance_to_go = 0.0;
        self.status.dtg = Pose::default();
        self.status.enables_queued = self.enables_new;
        self.resume();
    }

    /// Finish the head segment: spindle-offset bookkeeping, rotary
    /// relock, then pop. Returns false when the cycle should end here.
    fn complete_segment(&mut self, io: &mut dyn MotionIo) -> bool {
        let (id, synchronized, uu_per_rev, target, index_rotary) = {
            let tc = self.queue.item(0).unwrap();
            (tc.id, tc.synchronized, tc.uu_per_rev, tc.target, tc.index_rotary)
        };
        debug!(id, "segment finished");

        // Keep the spindle offset so the next synced move starts in
        // phase.
        if synchronized != SyncMode::None && uu_per_rev > 0.0 {
            self.spindle_track.offset += target / uu_per_rev;
        } else {
            self.spindle_track.offset = 0.0;
        }

        if index_rotary != -1 {
            // Relock the rotary axis before removing the move; if the
            // lock hasn't engaged yet, come back next cycle.
            io.set_rotary_unlock(index_rotary, false);
            if io.rotary_is_unlocked(index_rotary) {
                return false;
            }
        }

        self.queue.pop_front();
        !self.queue.is_empty()
    }

    /// Whether the successor may participate this cycle. Mutates the head
    /// to an exact stop when the successor's sync or at-speed needs one.
    fn next_eligible(&mut self) -> bool {
        let stepping = self.stepping;
        let (head, next) = self.queue.first_two_mut();
        let head = head.unwrap();

        if stepping || head.term_cond == TermCond::Stop {
            return false;
        }
        let Some(next) = next else {
            return false;
        };

        // The successor will wait for spindle sync or at-speed; might as
        // well stop at the exact boundary instead of blending into it.
        if head.synchronized != SyncMode::Position && next.synchronized == SyncMode::Position {
            head.term_cond = TermCond::Stop;
            return false;
        }
        if next.at_speed {
            head.term_cond = TermCond::Stop;
            return false;
        }
        true
    }

    /// While aborting, soft-reset once all motion has drained. Returns
    /// true when the reset happened.
    fn try_finish_abort(&mut self, use_next: bool) -> bool {
        let head_vel = self.queue.item(0).unwrap().current_vel;
        let next_vel = if use_next {
            self.queue.item(1).map(|tc| tc.current_vel)
        } else {
            None
        };
        let stopped = match next_vel {
            None => head_vel == 0.0,
            Some(nv) => head_vel == 0.0 && nv == 0.0,
        };

        if self.spindle_track.waiting_for_index.is_some()
            || self.spindle_track.waiting_for_atspeed.is_some()
            || stopped
        {
            debug!("abort drained, soft reset");
            self.soft_reset();
            return true;
        }
        false
    }

    /// Clear stale spindle waits and poll at-speed. Returns true when the
    /// cycle should wait.
    fn check_waiting(&mut self) -> bool {
        let head_id = self.queue.item(0).unwrap().id;

        if let Some(id) = self.spindle_track.waiting_for_index {
            if id != head_id {
                warn!(
                    waiting = id,
                    head = head_id,
                    "index wait was for a different motion, clearing"
                );
                self.spindle_track.waiting_for_index = None;
            }
        }
        if let Some(id) = self.spindle_track.waiting_for_atspeed {
            if id != head_id {
                warn!(
                    waiting = id,
                    head = head_id,
                    "at-speed wait was for a different motion, clearing"
                );
                self.spindle_track.waiting_for_atspeed = None;
            }
        }

        if self.spindle_track.waiting_for_atspeed.is_some() {
            if !self.spindle.at_speed {
                return true;
            }
            self.spindle_track.waiting_for_atspeed = None;
        }
        false
    }

    /// First-touch setup of the head segment. Returns false when the
    /// cycle must wait (at-speed, rotary unlock, index latch).
    fn activate_head(&mut self, io: &mut dyn MotionIo) -> bool {
        let (id, at_speed, synchronized, index_rotary, term_cond, motion_class) = {
            let tc = self.queue.item(0).unwrap();
            (
                tc.id,
                tc.at_speed,
                tc.synchronized,
                tc.index_rotary,
                tc.term_cond,
                tc.motion_class,
            )
        };

        // All position-synced streams start at-speed, not only segments
        // that asked for it.
        let needs_atspeed =
            at_speed || (synchronized == SyncMode::Position && !self.status.spindle_sync);
        if needs_atspeed && !self.spindle.at_speed {
            self.spindle_track.waiting_for_atspeed = Some(id);
            return false;
        }

        if index_rotary != -1 {
            io.set_rotary_unlock(index_rotary, true);
            if !io.rotary_is_unlocked(index_rotary) {
                return false;
            }
        }

        debug!(id, "activating segment");
        {
            let tc = self.queue.item_mut(0).unwrap();
            tc.active = true;
            tc.current_vel = 0.0;
            tc.blending = false;
            // Reserve acceleration for the overlap with the successor.
            if term_cond == TermCond::Parabolic {
                tc.accel_scale = 0.5;
            }
        }
        self.active_depth = 1;
        self.status.motion_class = motion_class;

        if synchronized == SyncMode::Position && !self.status.spindle_sync {
            debug!(id, "waiting for spindle index");
            self.spindle_track.waiting_for_index = Some(id);
            self.spindle.index_enable = true;
            self.spindle_track.offset = 0.0;
            return false;
        }
        true
    }

    /// Drop everything after an abort has drained all motion.
    fn soft_reset(&mut self) {
        self.queue.clear();
        self.goal_pos = self.current_pos;
        self.done = true;
        self.active_depth = 0;
        self.aborting = false;
        self.sync_mode = SyncMode::None;
        self.spindle_track.waiting_for_index = None;
        self.spindle_track.waiting_for_atspeed = None;
        self.status.exec_id = 0;
        self.status.motion_class = MotionClass::None;
        self.status.spindle_sync = false;
        self.status.current_vel = 0.0;
        self.resume();
    }
}
