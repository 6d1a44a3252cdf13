//! Error type for the fallible control-API surface.
//!
//! The cycle path itself is total: it never returns an error and remains
//! well defined for any planner state. Only command-side operations
//! (configuration, queueing) can fail, and they fail without mutating
//! planner state.

use thiserror::Error;

/// Command-side planner error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TpError {
    /// Motion was queued before cycle time and the velocity and
    /// acceleration bounds were all configured.
    #[error("planner is not configured")]
    NotConfigured,

    /// Cycle time must be strictly positive.
    #[error("cycle time must be positive, got {0}")]
    InvalidCycleTime(f64),

    /// Velocity bounds must be strictly positive.
    #[error("velocity bound must be positive, got {0}")]
    InvalidVelocity(f64),

    /// Acceleration bound must be strictly positive.
    #[error("acceleration bound must be positive, got {0}")]
    InvalidAccel(f64),

    /// Unknown termination condition value.
    #[error("invalid termination condition {0}")]
    InvalidTermCond(u8),

    /// Motion ids must be non-negative.
    #[error("invalid motion id {0}")]
    InvalidMotionId(i32),

    /// The segment queue is at capacity; retry after a segment completes.
    #[error("segment queue is full")]
    QueueFull,

    /// New motion cannot be queued while an abort is draining.
    #[error("planner is aborting; cannot queue new motion")]
    Aborting,

    /// Rigid tapping requires spindle synchronization to be configured.
    #[error("cannot add an unsynchronized rigid tap move")]
    UnsyncedRigidTap,

    /// The commanded circle has no usable radius or axis.
    #[error("degenerate circle geometry")]
    DegenerateCircle,

    /// Synchronized I/O index out of range.
    #[error("synchronized I/O index {0} out of range")]
    InvalidIoIndex(usize),

    /// Configuration file could not be loaded or failed validation.
    #[error("config: {0}")]
    Config(String),
}
