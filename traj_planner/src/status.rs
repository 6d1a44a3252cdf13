//! Motion status record and the host I/O seam.

use traj_posemath::Pose;

use crate::segment::SegmentId;
use crate::state::{EnableFlags, MotionClass};

/// Host-side effects the executor drives during a cycle.
///
/// The planner owns no hardware; synchronized outputs and rotary axis
/// locks go through this trait so the core stays testable with a mock.
pub trait MotionIo {
    /// Write a digital output.
    fn dio_write(&mut self, index: usize, value: bool);
    /// Write an analog output.
    fn aio_write(&mut self, index: usize, value: f64);
    /// Request that a rotary axis unlock (`true`) or relock (`false`).
    fn set_rotary_unlock(&mut self, axis: i32, unlock: bool);
    /// Whether the rotary axis is currently unlocked.
    fn rotary_is_unlocked(&self, axis: i32) -> bool;
}

/// Snapshot of the motion in progress, rewritten every cycle.
///
/// During a parabolic overlap the scalar fields describe the faster of the
/// two active segments, except `current_vel` which is the sum of both
/// contributions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionStatus {
    /// Commanded path velocity [user units/s].
    pub current_vel: f64,
    /// Requested velocity of the reported segment [user units/s].
    pub requested_vel: f64,
    /// Path length remaining on the reported segment [user units].
    pub distance_to_go: f64,
    /// Vector from the current pose to the reported segment's endpoint.
    pub dtg: Pose,
    /// Classification of the reported motion.
    pub motion_class: MotionClass,
    /// Id of the executing segment (0 when idle).
    pub exec_id: SegmentId,
    /// Segments currently queued.
    pub queue_len: usize,
    /// Motion is locked to spindle position.
    pub spindle_sync: bool,
    /// Override-enable bits of the reported segment.
    pub enables_queued: EnableFlags,
}
