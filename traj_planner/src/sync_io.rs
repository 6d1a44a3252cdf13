//! Synchronized digital/analog output staging.
//!
//! `set_dout` / `set_aout` calls between motions accumulate into a staging
//! record on the planner. The next segment queued consumes the record, and
//! the executor applies it once when that segment first runs, so output
//! changes land exactly at the segment boundary they were requested at.

use crate::status::MotionIo;

/// Number of synchronized digital output channels.
pub const MAX_DIO: usize = 16;

/// Number of synchronized analog output channels.
pub const MAX_AIO: usize = 16;

/// Pending synchronized output changes.
#[derive(Debug, Clone, Copy)]
pub struct SyncIo {
    /// Anything staged since the last consume.
    pub any_changed: bool,
    /// Bit per staged digital channel.
    pub dio_mask: u16,
    /// Bit per staged analog channel.
    pub aio_mask: u16,
    /// +1 = drive high, -1 = drive low, 0 = untouched.
    pub dios: [i8; MAX_DIO],
    /// Staged analog values.
    pub aios: [f64; MAX_AIO],
}

impl Default for SyncIo {
    fn default() -> Self {
        Self {
            any_changed: false,
            dio_mask: 0,
            aio_mask: 0,
            dios: [0; MAX_DIO],
            aios: [0.0; MAX_AIO],
        }
    }
}

impl SyncIo {
    /// Drop all staged changes.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Stage a digital output change.
    pub fn set_dout(&mut self, index: usize, start: bool) {
        if index >= MAX_DIO {
            return;
        }
        self.any_changed = true;
        self.dio_mask |= 1 << index;
        self.dios[index] = if start { 1 } else { -1 };
    }

    /// Stage an analog output change.
    pub fn set_aout(&mut self, index: usize, value: f64) {
        if index >= MAX_AIO {
            return;
        }
        self.any_changed = true;
        self.aio_mask |= 1 << index;
        self.aios[index] = value;
    }

    /// Consume the staged record, leaving the staging area empty.
    pub fn take(&mut self) -> Self {
        let staged = *self;
        self.clear();
        staged
    }

    /// Apply the staged changes through the host and mark them done.
    ///
    /// A segment dispatches its record at most once; after this call
    /// `any_changed` is false and further calls are no-ops.
    pub fn dispatch(&mut self, io: &mut dyn MotionIo) {
        if !self.any_changed {
            return;
        }
        for i in 0..MAX_DIO {
            if self.dio_mask & (1 << i) == 0 {
                continue;
            }
            if self.dios[i] > 0 {
                io.dio_write(i, true);
            }
            if self.dios[i] < 0 {
                io.dio_write(i, false);
            }
        }
        for i in 0..MAX_AIO {
            if self.aio_mask & (1 << i) == 0 {
                continue;
            }
            io.aio_write(i, self.aios[i]);
        }
        self.any_changed = false;
    }
}
