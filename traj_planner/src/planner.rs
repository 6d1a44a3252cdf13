//! Planner state, configuration and the segment builder API.
//!
//! [`TrajectoryPlanner`] is an explicit value owned by the host; every
//! operation takes it as a receiver. Command-side calls (configuration and
//! the `add_*` builders) run between control ticks; the executor half
//! lives in [`crate::executor`] and runs exactly once per tick.

use tracing::{debug, error};
use traj_posemath::{Cart, Pose};

use crate::blend::{BlendDecision, check_need_arc, connect_blend_arc, create_blend_arc};
use crate::{DEFAULT_LOOKAHEAD_DEPTH, DEFAULT_QUEUE_CAPACITY, DEFAULT_REVERSAL_DEBOUNCE};
use crate::config::PlannerConfig;
use crate::error::TpError;
use crate::executor::FeedState;
use crate::optimizer::run_optimization;
use crate::queue::SegmentQueue;
use crate::segment::{Segment, SegmentId};
use crate::spindle::{SpindleInterface, SpindleTracking};
use crate::state::{EnableFlags, MotionClass, SyncMode, TermCond};
use crate::status::MotionStatus;
use crate::sync_io::{MAX_AIO, MAX_DIO, SyncIo};

/// The trajectory planner.
///
/// `N` is the segment queue capacity, fixed at construction; the queue
/// storage is embedded, so the planner never allocates after creation.
pub struct TrajectoryPlanner<const N: usize = DEFAULT_QUEUE_CAPACITY> {
    /// Control period [s].
    pub(crate) cycle_time: f64,
    /// Default requested velocity for subsequent moves [user units/s].
    pub(crate) v_max: f64,
    /// Machine velocity ceiling for subsequent moves [user units/s].
    pub(crate) ini_max_vel: f64,
    /// Tool-tip velocity limit [user units/s].
    pub(crate) v_limit: f64,
    /// Acceleration ceiling [user units/s²].
    pub(crate) a_max: f64,

    /// Authoritative commanded position, updated every cycle.
    pub(crate) current_pos: Pose,
    /// Endpoint of the last queued segment.
    pub(crate) goal_pos: Pose,

    /// Id for the next queued segment.
    pub(crate) next_id: SegmentId,
    /// Termination condition applied to subsequent moves.
    pub(crate) term_cond: TermCond,
    /// Blend tolerance applied to subsequent moves [user units].
    pub(crate) tolerance: f64,

    pub(crate) pausing: bool,
    pub(crate) aborting: bool,
    /// Host single-step mode: suppress blending into the successor.
    pub(crate) stepping: bool,
    pub(crate) done: bool,

    /// Segments currently contributing motion (2 during a parabolic
    /// overlap, 1 otherwise, 0 when idle).
    pub(crate) active_depth: usize,

    /// Spindle sync mode applied to subsequent moves.
    pub(crate) sync_mode: SyncMode,
    /// Feed per spindle revolution for synced moves [user units/rev].
    pub(crate) uu_per_rev: f64,

    /// Net feed override from the host.
    pub(crate) net_feed_scale: f64,
    /// Enable bits reported while no segment executes.
    pub(crate) enables_new: EnableFlags,

    /// How many segments the rising-tide optimizer walks back.
    pub(crate) lookahead_depth: usize,
    /// Consecutive monotonic spindle samples required before a rigid-tap
    /// reversal fires.
    pub(crate) reversal_debounce: u8,

    pub(crate) spindle: SpindleInterface,
    pub(crate) spindle_track: SpindleTracking,

    /// Staged synchronized I/O, consumed by the next queued segment.
    pub(crate) staging: SyncIo,
    pub(crate) status: MotionStatus,
    pub(crate) queue: SegmentQueue<N>,
}

impl<const N: usize> Default for TrajectoryPlanner<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TrajectoryPlanner<N> {
    /// Create an unconfigured planner with an empty queue.
    pub fn new() -> Self {
        let mut tp = Self {
            cycle_time: 0.0,
            v_max: 0.0,
            ini_max_vel: 0.0,
            v_limit: 0.0,
            a_max: 0.0,
            current_pos: Pose::ZERO,
            goal_pos: Pose::ZERO,
            next_id: 0,
            term_cond: TermCond::Parabolic,
            tolerance: 0.0,
            pausing: false,
            aborting: false,
            stepping: false,
            done: true,
            active_depth: 0,
            sync_mode: SyncMode::None,
            uu_per_rev: 0.0,
            net_feed_scale: 1.0,
            enables_new: EnableFlags::default(),
            lookahead_depth: DEFAULT_LOOKAHEAD_DEPTH,
            reversal_debounce: DEFAULT_REVERSAL_DEBOUNCE,
            spindle: SpindleInterface::default(),
            spindle_track: SpindleTracking::default(),
            staging: SyncIo::default(),
            status: MotionStatus::default(),
            queue: SegmentQueue::new(),
        };
        tp.clear();
        tp
    }

    /// Create a planner from a validated configuration.
    ///
    /// Fails when the configured queue capacity does not fit the
    /// planner's compiled-in capacity `N`.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, TpError> {
        config.validate()?;
        if config.queue_capacity > N {
            return Err(TpError::Config(format!(
                "queue capacity {} exceeds the compiled-in capacity {N}",
                config.queue_capacity
            )));
        }
        let mut tp = Self::new();
        tp.set_cycle_time(config.cycle_time)?;
        tp.set_vmax(config.v_max, config.ini_max_vel)?;
        tp.set_vlimit(config.v_limit);
        tp.set_amax(config.a_max)?;
        tp.set_term_cond(config.term_cond, config.tolerance);
        tp.lookahead_depth = config.lookahead_depth;
        tp.reversal_debounce = config.reversal_debounce;
        Ok(tp)
    }

    /// Soft-initialize: drop all queued motion as if it had completed at
    /// the current position. Configuration (cycle time, limits) is kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.goal_pos = self.current_pos;
        self.next_id = 0;
        self.term_cond = TermCond::Parabolic;
        self.tolerance = 0.0;
        self.done = true;
        self.active_depth = 0;
        self.aborting = false;
        self.pausing = false;
        self.sync_mode = SyncMode::None;
        self.uu_per_rev = 0.0;
        self.spindle_track = SpindleTracking::default();
        self.status = MotionStatus::default();
        self.staging.clear();
    }

    // ─── Configuration ──────────────────────────────────────────────

    pub fn set_cycle_time(&mut self, secs: f64) -> Result<(), TpError> {
        if secs <= 0.0 {
            return Err(TpError::InvalidCycleTime(secs));
        }
        self.cycle_time = secs;
        Ok(())
    }

    /// Set the requested velocity and absolute maximum velocity applied
    /// to subsequent moves.
    pub fn set_vmax(&mut self, v_max: f64, ini_maxvel: f64) -> Result<(), TpError> {
        if v_max <= 0.0 {
            return Err(TpError::InvalidVelocity(v_max));
        }
        if ini_maxvel <= 0.0 {
            return Err(TpError::InvalidVelocity(ini_maxvel));
        }
        self.v_max = v_max;
        self.ini_max_vel = ini_maxvel;
        Ok(())
    }

    /// Set the tool-tip velocity limit. Negative values clamp to zero.
    pub fn set_vlimit(&mut self, v_limit: f64) {
        self.v_limit = v_limit.max(0.0);
    }

    pub fn set_amax(&mut self, a_max: f64) -> Result<(), TpError> {
        if a_max <= 0.0 {
            return Err(TpError::InvalidAccel(a_max));
        }
        self.a_max = a_max;
        Ok(())
    }

    /// Set the id assigned to the next queued motion. Subsequent motions
    /// count up from it.
    pub fn set_id(&mut self, id: SegmentId) -> Result<(), TpError> {
        if id < 0 {
            error!(id, "rejecting invalid motion id");
            return Err(TpError::InvalidMotionId(id));
        }
        self.next_id = id;
        Ok(())
    }

    /// Set the termination condition and blend tolerance applied to
    /// subsequent moves.
    pub fn set_term_cond(&mut self, cond: TermCond, tolerance: f64) {
        self.term_cond = cond;
        self.tolerance = tolerance;
    }

    /// Raw-integer variant of [`Self::set_term_cond`] for hosts that
    /// speak the wire encoding. Rejects unknown condition values.
    pub fn set_term_cond_u8(&mut self, cond: u8, tolerance: f64) -> Result<(), TpError> {
        let Some(cond) = TermCond::from_u8(cond) else {
            error!(cond, "rejecting invalid termination condition");
            return Err(TpError::InvalidTermCond(cond));
        };
        self.set_term_cond(cond, tolerance);
        Ok(())
    }

    /// Tell the planner its initial position. Sets both the current and
    /// goal positions; only meaningful while no motion is queued.
    pub fn set_pos(&mut self, pos: Pose) {
        self.current_pos = pos;
        self.goal_pos = pos;
    }

    /// Configure spindle synchronization for subsequent moves.
    ///
    /// A zero `uu_per_rev` turns synchronization off; otherwise
    /// `velocity_mode` selects velocity tracking over position tracking.
    pub fn set_spindle_sync(&mut self, uu_per_rev: f64, velocity_mode: bool) {
        if uu_per_rev != 0.0 {
            self.sync_mode = if velocity_mode {
                SyncMode::Velocity
            } else {
                SyncMode::Position
            };
            self.uu_per_rev = uu_per_rev;
        } else {
            self.sync_mode = SyncMode::None;
        }
    }

    /// Net feed override from the host.
    pub fn set_feed_scale(&mut self, scale: f64) {
        self.net_feed_scale = scale.max(0.0);
    }

    /// Enable bits reported while the queue is empty.
    pub fn set_enables(&mut self, enables: EnableFlags) {
        self.enables_new = enables;
    }

    /// Host single-step mode: the executor will not blend into the
    /// successor while set.
    pub fn set_stepping(&mut self, stepping: bool) {
        self.stepping = stepping;
    }

    // ─── Runtime control ────────────────────────────────────────────

    pub fn pause(&mut self) {
        self.pausing = true;
    }

    pub fn resume(&mut self) {
        self.pausing = false;
    }

    /// Begin a controlled stop. Motion decelerates to zero over the
    /// following cycles, after which the planner soft-resets. Staged
    /// synchronized I/O is dropped immediately.
    pub fn abort(&mut self) {
        if !self.aborting {
            self.pause();
            self.aborting = true;
        }
        self.staging.clear();
    }

    // ─── Synchronized I/O staging ───────────────────────────────────

    /// Stage a digital output change to fire at the next queued motion.
    ///
    /// `end` is latched for interface compatibility but the canon layer
    /// cannot set a distinct end value, so only `start` is applied.
    pub fn set_dout(&mut self, index: usize, start: bool, _end: bool) -> Result<(), TpError> {
        if index >= MAX_DIO {
            return Err(TpError::InvalidIoIndex(index));
        }
        self.staging.set_dout(index, start);
        Ok(())
    }

    /// Stage an analog output change to fire at the next queued motion.
    pub fn set_aout(&mut self, index: usize, start: f64, _end: f64) -> Result<(), TpError> {
        if index >= MAX_AIO {
            return Err(TpError::InvalidIoIndex(index));
        }
        self.staging.set_aout(index, start);
        Ok(())
    }

    // ─── Introspection ──────────────────────────────────────────────

    /// Authoritative commanded position.
    pub fn pos(&self) -> Pose {
        self.current_pos
    }

    /// Endpoint of the last queued segment.
    pub fn goal(&self) -> Pose {
        self.goal_pos
    }

    /// Id of the executing segment (0 when idle).
    pub fn exec_id(&self) -> SegmentId {
        self.status.exec_id
    }

    /// Classification of the current motion.
    pub fn motion_class(&self) -> MotionClass {
        self.status.motion_class
    }

    /// True once all queued motion has completed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of queued segments.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Number of segments currently contributing motion.
    pub fn active_depth(&self) -> usize {
        self.active_depth
    }

    /// Motion status snapshot, rewritten each cycle.
    pub fn status(&self) -> &MotionStatus {
        &self.status
    }

    /// Spindle command/feedback record.
    pub fn spindle(&self) -> &SpindleInterface {
        &self.spindle
    }

    /// Mutable spindle record for the host to refresh feedback on.
    pub fn spindle_mut(&mut self) -> &mut SpindleInterface {
        &mut self.spindle
    }

    /// Configured spindle sync mode for subsequent moves.
    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Configured control period [s].
    pub fn cycle_time(&self) -> f64 {
        self.cycle_time
    }

    /// Default requested / machine velocity bounds for subsequent moves.
    pub fn v_max(&self) -> (f64, f64) {
        (self.v_max, self.ini_max_vel)
    }

    /// Tool-tip velocity limit [user units/s].
    pub fn v_limit(&self) -> f64 {
        self.v_limit
    }

    /// Acceleration ceiling [user units/s²].
    pub fn a_max(&self) -> f64 {
        self.a_max
    }

    /// Rising-tide optimizer walk bound [segments].
    pub fn lookahead_depth(&self) -> usize {
        self.lookahead_depth
    }

    /// Consecutive monotonic spindle samples required for a rigid-tap
    /// reversal.
    pub fn reversal_debounce(&self) -> u8 {
        self.reversal_debounce
    }

    // ─── Segment builders ───────────────────────────────────────────

    /// Queue a coordinated straight move from the current goal position.
    #[allow(clippy::too_many_arguments)]
    pub fn add_line(
        &mut self,
        end: Pose,
        class: MotionClass,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
        at_speed: bool,
        index_rotary: i32,
    ) -> Result<SegmentId, TpError> {
        self.check_can_queue()?;

        let mut tc = Segment::line(
            self.cycle_time,
            &self.goal_pos,
            &end,
            vel,
            ini_maxvel,
            acc,
            enables,
        );
        tc.motion_class = class;
        tc.at_speed = at_speed;
        tc.term_cond = self.term_cond;
        tc.tolerance = self.tolerance;
        tc.synchronized = self.sync_mode;
        tc.uu_per_rev = self.uu_per_rev;
        tc.index_rotary = index_rotary;
        tc.consume_staged_io(&mut self.staging);

        self.handle_blend_arc(&mut tc);
        Self::clip_velocity_limit(self.cycle_time, &mut tc);
        self.add_segment_to_queue(tc, end)
    }

    /// Queue a circular, arc or helical move about `center`/`normal`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_circle(
        &mut self,
        end: Pose,
        center: Cart,
        normal: Cart,
        turn: u32,
        class: MotionClass,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
        at_speed: bool,
    ) -> Result<SegmentId, TpError> {
        self.check_can_queue()?;

        let Some(mut tc) = Segment::circle(
            self.cycle_time,
            &self.goal_pos,
            &end,
            center,
            normal,
            turn,
            vel,
            ini_maxvel,
            acc,
            enables,
        ) else {
            error!("rejecting degenerate circle");
            return Err(TpError::DegenerateCircle);
        };
        tc.motion_class = class;
        tc.at_speed = at_speed;
        tc.term_cond = self.term_cond;
        tc.tolerance = self.tolerance;
        tc.synchronized = self.sync_mode;
        tc.uu_per_rev = self.uu_per_rev;
        tc.consume_staged_io(&mut self.staging);

        Self::clip_velocity_limit(self.cycle_time, &mut tc);
        self.add_segment_to_queue(tc, end)
    }

    /// Queue a rigid-tapping cycle. Requires spindle synchronization.
    pub fn add_rigid_tap(
        &mut self,
        end: Pose,
        vel: f64,
        ini_maxvel: f64,
        acc: f64,
        enables: EnableFlags,
    ) -> Result<SegmentId, TpError> {
        self.check_can_queue()?;

        if self.sync_mode == SyncMode::None {
            error!("cannot add unsynchronized rigid tap move");
            return Err(TpError::UnsyncedRigidTap);
        }

        let mut tc = Segment::rigid_tap(
            self.cycle_time,
            &self.goal_pos,
            &end,
            vel,
            ini_maxvel,
            acc,
            enables,
            self.uu_per_rev,
        );
        tc.term_cond = TermCond::Stop;
        tc.tolerance = self.tolerance;
        tc.synchronized = self.sync_mode;
        tc.consume_staged_io(&mut self.staging);

        self.add_segment_to_queue(tc, end)
    }

    // ─── Internals ──────────────────────────────────────────────────

    pub(crate) fn feed_state(&self) -> FeedState {
        FeedState {
            scale: self.net_feed_scale,
            pausing: self.pausing,
            aborting: self.aborting,
        }
    }

    fn check_can_queue(&self) -> Result<(), TpError> {
        if self.aborting {
            error!("planner is aborting, rejecting new motion");
            return Err(TpError::Aborting);
        }
        // Queueing motion on an unconfigured planner would divide by the
        // zero cycle time and produce segments that can never complete.
        if self.cycle_time <= 0.0
            || self.v_max <= 0.0
            || self.ini_max_vel <= 0.0
            || self.a_max <= 0.0
        {
            error!("planner is not configured, rejecting new motion");
            return Err(TpError::NotConfigured);
        }
        Ok(())
    }

    /// Keep one cycle's travel well inside the segment so progress can
    /// never step over more than half of it per sample.
    fn clip_velocity_limit(cycle_time: f64, tc: &mut Segment) {
        let sample_maxvel = 0.5 * tc.target / cycle_time;
        if tc.max_vel > sample_maxvel {
            debug!(
                id = tc.id,
                from = tc.max_vel,
                to = sample_maxvel,
                "clipping segment velocity to sample limit"
            );
            tc.max_vel = sample_maxvel;
        }
    }

    /// Decide how the incoming line meets its predecessor: mark the pair
    /// tangent, insert a blend arc and trim both lines, or leave them to
    /// the parabolic overlap.
    fn handle_blend_arc(&mut self, tc: &mut Segment) {
        // The arc and the incoming line each need a queue slot; never trim
        // the predecessor unless both will fit.
        if self.queue.len() + 2 > N {
            return;
        }
        let cycle_time = self.cycle_time;
        let feed = self.feed_state();

        let decision = {
            let Some(prev) = self.queue.last() else {
                return;
            };
            // Never rewrite a segment the executor has started.
            if prev.progress > 0.0 {
                return;
            }
            check_need_arc(prev, tc)
        };

        match decision {
            BlendDecision::NoBlend => {}
            BlendDecision::Tangent => {
                if let Some(prev) = self.queue.last_mut() {
                    prev.term_cond = TermCond::Tangent;
                }
            }
            BlendDecision::Arc => {
                let (blend, removable) = {
                    let Some(prev) = self.queue.last_mut() else {
                        return;
                    };
                    let Some(mut blend) =
                        create_blend_arc(cycle_time, &feed, prev, tc, &mut self.staging)
                    else {
                        return;
                    };
                    let removable = connect_blend_arc(prev, tc, &blend);
                    Self::clip_velocity_limit(cycle_time, &mut blend);
                    (blend, removable)
                };

                if removable {
                    debug!("predecessor fully consumed by blend arc");
                    self.queue.pop_back();
                } else if let Some(prev) = self.queue.last_mut() {
                    Self::clip_velocity_limit(cycle_time, prev);
                }

                // Cannot fail: capacity was checked above.
                let _ = self.add_segment_to_queue_inner(blend);
                run_optimization(&mut self.queue, self.lookahead_depth);
            }
        }
    }

    fn add_segment_to_queue_inner(&mut self, mut tc: Segment) -> Result<SegmentId, TpError> {
        tc.id = self.next_id;
        let id = tc.id;
        self.queue.push(tc)?;
        debug!(id, depth = self.queue.len(), "queued segment");
        self.done = false;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    fn add_segment_to_queue(&mut self, tc: Segment, end: Pose) -> Result<SegmentId, TpError> {
        let id = self.add_segment_to_queue_inner(tc)?;
        self.goal_pos = end;
        run_optimization(&mut self.queue, self.lookahead_depth);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Planner = TrajectoryPlanner<8>;

    fn pose(x: f64, y: f64, z: f64) -> Pose {
        Pose::from_triplets(Cart::new(x, y, z), Cart::zeros(), Cart::zeros())
    }

    fn configured() -> Planner {
        let mut tp = Planner::new();
        tp.set_cycle_time(0.001).unwrap();
        tp.set_vmax(10.0, 10.0).unwrap();
        tp.set_vlimit(100.0);
        tp.set_amax(100.0).unwrap();
        tp
    }

    #[test]
    fn invalid_configuration_rejected() {
        let mut tp = Planner::new();
        assert!(matches!(
            tp.set_cycle_time(0.0),
            Err(TpError::InvalidCycleTime(_))
        ));
        assert!(matches!(
            tp.set_vmax(-1.0, 1.0),
            Err(TpError::InvalidVelocity(_))
        ));
        assert!(matches!(tp.set_amax(0.0), Err(TpError::InvalidAccel(_))));
        assert!(matches!(tp.set_id(-3), Err(TpError::InvalidMotionId(-3))));
    }

    #[test]
    fn set_pos_roundtrip() {
        let mut tp = configured();
        let p = pose(1.0, 2.0, 3.0);
        tp.set_pos(p);
        assert_eq!(tp.pos(), p);
        assert_eq!(tp.goal(), p);
    }

    #[test]
    fn goal_tracks_last_enqueue() {
        let mut tp = configured();
        tp.add_line(
            pose(1.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        assert_eq!(tp.goal(), pose(1.0, 0.0, 0.0));
        tp.add_line(
            pose(1.0, 2.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        assert_eq!(tp.goal(), pose(1.0, 2.0, 0.0));
        assert!(!tp.is_done());
    }

    #[test]
    fn ids_count_up_from_set_id() {
        let mut tp = configured();
        tp.set_id(7).unwrap();
        let a = tp
            .add_line(
                pose(1.0, 0.0, 0.0),
                MotionClass::Feed,
                1.0,
                1.0,
                10.0,
                EnableFlags::default(),
                false,
                -1,
            )
            .unwrap();
        let b = tp
            .add_line(
                pose(2.0, 0.0, 0.0),
                MotionClass::Feed,
                1.0,
                1.0,
                10.0,
                EnableFlags::default(),
                false,
                -1,
            )
            .unwrap();
        assert_eq!(a, 7);
        assert_eq!(b, 8);
    }

    #[test]
    fn queue_full_reported() {
        let mut tp: TrajectoryPlanner<2> = TrajectoryPlanner::new();
        tp.set_cycle_time(0.001).unwrap();
        tp.set_vmax(10.0, 10.0).unwrap();
        tp.set_amax(100.0).unwrap();
        tp.set_term_cond(TermCond::Stop, 0.0);
        for i in 0..2 {
            tp.add_line(
                pose(i as f64 + 1.0, 0.0, 0.0),
                MotionClass::Feed,
                1.0,
                1.0,
                10.0,
                EnableFlags::default(),
                false,
                -1,
            )
            .unwrap();
        }
        let err = tp.add_line(
            pose(9.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        );
        assert_eq!(err, Err(TpError::QueueFull));
        // A failed enqueue must not move the goal.
        assert_eq!(tp.goal(), pose(2.0, 0.0, 0.0));
    }

    #[test]
    fn abort_rejects_new_motion() {
        let mut tp = configured();
        tp.add_line(
            pose(1.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        tp.abort();
        let err = tp.add_line(
            pose(2.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        );
        assert_eq!(err, Err(TpError::Aborting));
    }

    #[test]
    fn rigid_tap_requires_sync() {
        let mut tp = configured();
        let err = tp.add_rigid_tap(pose(0.0, 0.0, -5.0), 1.0, 1.0, 10.0, EnableFlags::default());
        assert_eq!(err, Err(TpError::UnsyncedRigidTap));

        tp.set_spindle_sync(1.0, false);
        assert_eq!(tp.sync_mode(), SyncMode::Position);
        tp.add_rigid_tap(pose(0.0, 0.0, -5.0), 1.0, 1.0, 10.0, EnableFlags::default())
            .unwrap();
    }

    #[test]
    fn spindle_sync_tristate_mapping() {
        let mut tp = configured();
        tp.set_spindle_sync(0.5, true);
        assert_eq!(tp.sync_mode(), SyncMode::Velocity);
        tp.set_spindle_sync(0.0, true);
        assert_eq!(tp.sync_mode(), SyncMode::None);
        tp.set_spindle_sync(2.0, false);
        assert_eq!(tp.sync_mode(), SyncMode::Position);
    }

    #[test]
    fn nyquist_clip_applies_to_short_segments() {
        let mut tp = configured();
        tp.set_term_cond(TermCond::Stop, 0.0);
        tp.add_line(
            pose(0.001, 0.0, 0.0),
            MotionClass::Feed,
            10.0,
            10.0,
            100.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        let tc = tp.queue.item(0).unwrap();
        // 0.5 * target / cycle_time = 0.5 * 0.001 / 0.001 = 0.5
        assert!(tc.max_vel <= 0.5 + 1e-12);
    }

    #[test]
    fn arc_insertion_grows_queue_and_trims_predecessor() {
        let mut tp = configured();
        tp.set_term_cond(TermCond::Parabolic, 0.05);
        tp.add_line(
            pose(2.0, 0.0, 0.0),
            MotionClass::Feed,
            0.5,
            0.5,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        tp.add_line(
            pose(2.0, 2.0, 0.0),
            MotionClass::Feed,
            0.5,
            0.5,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();

        // Line, arc, line.
        assert_eq!(tp.queue_depth(), 3);
        let prev = tp.queue.item(0).unwrap();
        let arc = tp.queue.item(1).unwrap();
        assert!(prev.target < 2.0);
        assert_eq!(prev.term_cond, TermCond::Tangent);
        assert_eq!(arc.term_cond, TermCond::Tangent);
        assert_eq!(arc.motion_class, MotionClass::Arc);
        // Rising tide lifted the predecessor's final velocity.
        assert!(prev.final_vel > 0.0);
    }

    #[test]
    fn colinear_lines_marked_tangent() {
        let mut tp = configured();
        tp.set_term_cond(TermCond::Parabolic, 0.0);
        tp.add_line(
            pose(1.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        tp.add_line(
            pose(2.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();

        assert_eq!(tp.queue_depth(), 2);
        let first = tp.queue.item(0).unwrap();
        assert_eq!(first.term_cond, TermCond::Tangent);
        assert!(first.final_vel > 0.0);
    }

    #[test]
    fn staged_io_latches_onto_next_segment() {
        let mut tp = configured();
        tp.set_dout(3, true, true).unwrap();
        tp.add_line(
            pose(1.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        let tc = tp.queue.item(0).unwrap();
        assert!(tc.sync_io.any_changed);
        assert_eq!(tc.sync_io.dio_mask, 1 << 3);
        // Staging drained: the following segment gets nothing.
        tp.add_line(
            pose(2.0, 1.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
        assert!(!tp.queue.last().unwrap().sync_io.any_changed);
    }

    #[test]
    fn io_index_bounds_checked() {
        let mut tp = configured();
        assert!(matches!(
            tp.set_dout(MAX_DIO, true, true),
            Err(TpError::InvalidIoIndex(_))
        ));
        assert!(matches!(
            tp.set_aout(MAX_AIO, 1.0, 1.0),
            Err(TpError::InvalidIoIndex(_))
        ));
    }

    #[test]
    fn from_config_applies_fields() {
        let config = PlannerConfig {
            cycle_time: 0.002,
            v_max: 5.0,
            ini_max_vel: 6.0,
            v_limit: 7.0,
            a_max: 8.0,
            term_cond: TermCond::Stop,
            tolerance: 0.1,
            queue_capacity: 8,
            lookahead_depth: 10,
            reversal_debounce: 2,
        };
        let tp: TrajectoryPlanner<8> = TrajectoryPlanner::from_config(&config).unwrap();
        assert_eq!(tp.cycle_time, 0.002);
        assert_eq!(tp.v_limit, 7.0);
        assert_eq!(tp.term_cond, TermCond::Stop);
        assert_eq!(tp.tolerance, 0.1);
        assert_eq!(tp.lookahead_depth(), 10);
        assert_eq!(tp.reversal_debounce(), 2);
    }

    #[test]
    fn from_config_rejects_oversized_queue() {
        let config = PlannerConfig {
            queue_capacity: 16,
            ..Default::default()
        };
        let result: Result<TrajectoryPlanner<8>, _> = TrajectoryPlanner::from_config(&config);
        assert!(matches!(result, Err(TpError::Config(_))));
    }

    #[test]
    fn unconfigured_planner_rejects_motion() {
        let mut tp = Planner::new();
        let err = tp.add_line(
            pose(1.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        );
        assert_eq!(err, Err(TpError::NotConfigured));

        // Partial configuration is still rejected.
        tp.set_cycle_time(0.001).unwrap();
        tp.set_vmax(10.0, 10.0).unwrap();
        let err = tp.add_rigid_tap(
            pose(0.0, 0.0, -5.0),
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
        );
        assert_eq!(err, Err(TpError::NotConfigured));
        assert_eq!(tp.queue_depth(), 0);

        tp.set_amax(100.0).unwrap();
        tp.add_line(
            pose(1.0, 0.0, 0.0),
            MotionClass::Feed,
            1.0,
            1.0,
            10.0,
            EnableFlags::default(),
            false,
            -1,
        )
        .unwrap();
    }

    #[test]
    fn raw_term_cond_validated() {
        let mut tp = configured();
        tp.set_term_cond_u8(2, 0.01).unwrap();
        assert_eq!(tp.term_cond, TermCond::Tangent);
        assert_eq!(tp.tolerance, 0.01);
        assert_eq!(tp.set_term_cond_u8(3, 0.0), Err(TpError::InvalidTermCond(3)));
        // A rejected condition leaves the previous setting in place.
        assert_eq!(tp.term_cond, TermCond::Tangent);
    }
}
