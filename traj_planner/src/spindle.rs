//! Spindle interface and synchronization modes.
//!
//! The host refreshes the feedback half of [`SpindleInterface`] before each
//! cycle and applies the command half afterwards. Both synchronization
//! modes rewrite the active segment's requested velocity; the trapezoidal
//! integrator then does the rest, so tracking error can never demand more
//! acceleration than the segment allows.

use crate::segment::{Segment, SegmentGeometry, SegmentId};
use crate::state::TapState;

/// Spindle command/feedback record shared with the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpindleInterface {
    /// Commanded speed [rev/s]. Rigid tapping flips its sign to reverse
    /// the spindle; the host must forward it to the drive each cycle.
    pub speed_cmd: f64,
    /// Measured speed [rev/s].
    pub speed_rps: f64,
    /// Accumulated position feedback [rev], magnitude only.
    pub revs_in: f64,
    /// Commanded direction (+1 forward, -1 reverse).
    pub direction: i8,
    /// Spindle has reached commanded speed.
    pub at_speed: bool,
    /// Index-latch handshake: the planner raises this to request an index
    /// reset; the encoder driver clears it when the index pulse passes.
    pub index_enable: bool,
}

impl SpindleInterface {
    /// Position feedback signed by the commanded direction [rev].
    #[inline]
    pub fn signed_position(&self) -> f64 {
        if self.direction < 0 { -self.revs_in } else { self.revs_in }
    }
}

/// Planner-internal spindle bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpindleTracking {
    /// Revolutions already consumed by completed synchronized segments.
    pub offset: f64,
    /// Spindle position at the last cycle [rev].
    pub revs: f64,
    /// Segment waiting for the index pulse, if any.
    pub waiting_for_index: Option<SegmentId>,
    /// Segment waiting for the spindle to reach speed, if any.
    pub waiting_for_atspeed: Option<SegmentId>,
}

/// Velocity-mode sync: requested velocity follows spindle speed.
///
/// Progress already earned by the successor during a blend counts against
/// the distance the spindle has authorized.
pub(crate) fn sync_velocity_mode(tc: &mut Segment, next_progress: f64, spindle: &SpindleInterface) {
    let mut vel = spindle.speed_rps.abs() * tc.uu_per_rev;
    vel -= next_progress;
    tc.req_vel = vel.max(0.0);
}

/// Position-mode sync: requested velocity tracks spindle angular position.
///
/// While `sync_accel` counts up the axis is still catching the spindle
/// from rest: it accelerates flat out until its velocity meets the
/// spindle-implied target, then locks the offset so the position error is
/// driven to zero on the next cycle. Once locked, the requested velocity
/// is the spindle-implied feed plus a square-root correction toward zero
/// position error.
pub(crate) fn sync_position_mode(
    tc: &mut Segment,
    next_progress: f64,
    spindle: &SpindleInterface,
    track: &mut SpindleTracking,
) {
    let spindle_pos = spindle.signed_position();
    let oldrevs = track.revs;

    track.revs = match &tc.geometry {
        SegmentGeometry::RigidTap(rt)
            if matches!(rt.state, TapState::Retraction | TapState::FinalReversal) =>
        {
            // Backing out: count revolutions from the reversal point.
            rt.spindle_revs_at_reversal - spindle_pos
        }
        _ => spindle_pos,
    };

    let pos_error =
        (track.revs - track.offset) * tc.uu_per_rev - tc.progress - next_progress;

    if tc.sync_accel > 0 {
        let spindle_vel = track.revs / (tc.cycle_time * tc.sync_accel as f64);
        let target_vel = spindle_vel * tc.uu_per_rev;
        if tc.current_vel >= target_vel {
            // Velocities match: move the offset so the position error is
            // zero from here on, and drop out of the catch-up phase.
            track.offset = track.revs - tc.progress / tc.uu_per_rev;
            tc.sync_accel = 0;
            tc.req_vel = target_vel;
        } else {
            // Still behind: accelerate as fast as the segment allows.
            tc.req_vel = tc.max_vel;
            tc.sync_accel += 1;
        }
    } else {
        let spindle_vel = (track.revs - oldrevs) / tc.cycle_time;
        let target_vel = spindle_vel * tc.uu_per_rev;
        let mut error_vel = (pos_error.abs() * tc.scaled_accel()).sqrt();
        if pos_error < 0.0 {
            error_vel = -error_vel;
        }
        tc.req_vel = target_vel + error_vel;
    }

    if tc.req_vel < 0.0 {
        tc.req_vel = 0.0;
    }
}
