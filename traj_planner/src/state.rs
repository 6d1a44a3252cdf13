//! State enums and flag sets for the planner.
//!
//! All enums use `#[repr(u8)]` for compact storage and carry `from_u8`
//! conversions for hosts that speak raw integers over their command
//! interface.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// How motion transitions out of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TermCond {
    /// Come to a complete stop before the next segment begins.
    Stop = 0,
    /// Overlap the tail of this segment with the head of the next.
    Parabolic = 1,
    /// Hand off at speed; the next segment continues the same tangent.
    Tangent = 2,
}

impl TermCond {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Stop),
            1 => Some(Self::Parabolic),
            2 => Some(Self::Tangent),
            _ => None,
        }
    }
}

impl Default for TermCond {
    fn default() -> Self {
        Self::Parabolic
    }
}

/// Spindle synchronization mode of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SyncMode {
    /// Free motion.
    None = 0,
    /// Requested velocity tracks spindle speed.
    Velocity = 1,
    /// Progress locks to spindle angular position (threading, tapping).
    Position = 2,
}

impl SyncMode {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Velocity),
            2 => Some(Self::Position),
            _ => None,
        }
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        Self::None
    }
}

/// Phase of a rigid-tapping cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TapState {
    /// Plunging in sync with the spindle.
    Tapping = 0,
    /// Spindle reversal commanded; waiting for it to actually turn around.
    Reversing = 1,
    /// Backing out in sync with the reversed spindle.
    Retraction = 2,
    /// Second reversal commanded at the top of the retract.
    FinalReversal = 3,
    /// Unsynchronized positioning back to the start point.
    FinalPlacement = 4,
}

impl TapState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Tapping),
            1 => Some(Self::Reversing),
            2 => Some(Self::Retraction),
            3 => Some(Self::FinalReversal),
            4 => Some(Self::FinalPlacement),
            _ => None,
        }
    }
}

/// Classification of a motion reported upward to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MotionClass {
    /// No motion in progress.
    None = 0,
    /// Rapid positioning; feed override does not apply.
    Traverse = 1,
    /// Coordinated feed motion.
    Feed = 2,
    /// Circular or helical feed motion.
    Arc = 3,
    /// Tool change related motion.
    Toolchange = 4,
    /// Probing move.
    Probing = 5,
    /// Indexed rotary move.
    IndexRotary = 6,
}

impl MotionClass {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Traverse),
            2 => Some(Self::Feed),
            3 => Some(Self::Arc),
            4 => Some(Self::Toolchange),
            5 => Some(Self::Probing),
            6 => Some(Self::IndexRotary),
            _ => None,
        }
    }
}

impl Default for MotionClass {
    fn default() -> Self {
        Self::None
    }
}

bitflags! {
    /// Override-enable bits latched with each segment and reported in the
    /// motion status while that segment executes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnableFlags: u8 {
        /// Feed override applies to this motion.
        const FEED_OVERRIDE    = 0x01;
        /// Spindle override applies to this motion.
        const SPINDLE_OVERRIDE = 0x02;
        /// Feed hold is honored during this motion.
        const FEED_HOLD        = 0x04;
        /// Adaptive feed input applies to this motion.
        const ADAPTIVE_FEED    = 0x08;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_cond_roundtrip() {
        for v in 0..=2u8 {
            assert_eq!(TermCond::from_u8(v).unwrap() as u8, v);
        }
        assert!(TermCond::from_u8(3).is_none());
    }

    #[test]
    fn sync_mode_roundtrip() {
        for v in 0..=2u8 {
            assert_eq!(SyncMode::from_u8(v).unwrap() as u8, v);
        }
        assert!(SyncMode::from_u8(3).is_none());
    }

    #[test]
    fn tap_state_roundtrip() {
        for v in 0..=4u8 {
            assert_eq!(TapState::from_u8(v).unwrap() as u8, v);
        }
        assert!(TapState::from_u8(5).is_none());
    }

    #[test]
    fn motion_class_roundtrip() {
        for v in 0..=6u8 {
            assert_eq!(MotionClass::from_u8(v).unwrap() as u8, v);
        }
        assert!(MotionClass::from_u8(7).is_none());
    }

    #[test]
    fn defaults() {
        assert_eq!(TermCond::default(), TermCond::Parabolic);
        assert_eq!(SyncMode::default(), SyncMode::None);
        assert_eq!(MotionClass::default(), MotionClass::None);
        assert!(EnableFlags::default().is_empty());
    }
}
