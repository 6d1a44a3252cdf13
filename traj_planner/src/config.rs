//! Planner configuration with TOML loading and validation.
//!
//! Hosts can either call the individual setters on the planner or load a
//! `PlannerConfig` from a TOML file at startup and apply it in one shot.
//! Every field has a serde default so partial files stay valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TpError;
use crate::state::TermCond;
use crate::{DEFAULT_LOOKAHEAD_DEPTH, DEFAULT_QUEUE_CAPACITY, DEFAULT_REVERSAL_DEBOUNCE};

/// Static planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Control period [s].
    #[serde(default = "default_cycle_time")]
    pub cycle_time: f64,
    /// Default requested velocity bound for queued moves [user units/s].
    #[serde(default = "default_v_max")]
    pub v_max: f64,
    /// Machine velocity ceiling before axis limits bite [user units/s].
    #[serde(default = "default_v_max")]
    pub ini_max_vel: f64,
    /// Tool-tip velocity limit [user units/s].
    #[serde(default = "default_v_limit")]
    pub v_limit: f64,
    /// Acceleration ceiling [user units/s²].
    #[serde(default = "default_a_max")]
    pub a_max: f64,
    /// Termination condition applied to subsequent moves.
    #[serde(default)]
    pub term_cond: TermCond,
    /// Blend tolerance applied to subsequent moves [user units].
    #[serde(default)]
    pub tolerance: f64,
    /// Segment queue capacity the host plans for; checked against the
    /// planner's compiled-in capacity when the planner is built.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How many segments the rising-tide optimizer walks back from the
    /// queue tail.
    #[serde(default = "default_lookahead_depth")]
    pub lookahead_depth: usize,
    /// Consecutive monotonic spindle-position samples required before a
    /// rigid-tap reversal transition fires.
    #[serde(default = "default_reversal_debounce")]
    pub reversal_debounce: u8,
}

fn default_cycle_time() -> f64 {
    0.001
}
fn default_v_max() -> f64 {
    100.0
}
fn default_v_limit() -> f64 {
    100.0
}
fn default_a_max() -> f64 {
    1000.0
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_lookahead_depth() -> usize {
    DEFAULT_LOOKAHEAD_DEPTH
}
fn default_reversal_debounce() -> u8 {
    DEFAULT_REVERSAL_DEBOUNCE
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cycle_time: 0.001,
            v_max: 100.0,
            ini_max_vel: 100.0,
            v_limit: 100.0,
            a_max: 1000.0,
            term_cond: TermCond::default(),
            tolerance: 0.0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lookahead_depth: DEFAULT_LOOKAHEAD_DEPTH,
            reversal_debounce: DEFAULT_REVERSAL_DEBOUNCE,
        }
    }
}

impl PlannerConfig {
    /// Check parameter bounds.
    pub fn validate(&self) -> Result<(), TpError> {
        if self.cycle_time <= 0.0 {
            return Err(TpError::InvalidCycleTime(self.cycle_time));
        }
        if self.v_max <= 0.0 {
            return Err(TpError::InvalidVelocity(self.v_max));
        }
        if self.ini_max_vel <= 0.0 {
            return Err(TpError::InvalidVelocity(self.ini_max_vel));
        }
        if self.v_limit < 0.0 {
            return Err(TpError::InvalidVelocity(self.v_limit));
        }
        if self.a_max <= 0.0 {
            return Err(TpError::InvalidAccel(self.a_max));
        }
        if self.tolerance < 0.0 {
            return Err(TpError::Config(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.queue_capacity == 0 {
            return Err(TpError::Config(
                "queue capacity must be positive".to_string(),
            ));
        }
        if self.lookahead_depth < 2 {
            return Err(TpError::Config(format!(
                "lookahead depth must be at least 2, got {}",
                self.lookahead_depth
            )));
        }
        if self.reversal_debounce == 0 {
            return Err(TpError::Config(
                "reversal debounce must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, TpError> {
        let config: Self =
            toml::from_str(text).map_err(|e| TpError::Config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, TpError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TpError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }
}
