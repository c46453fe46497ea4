//! Server configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default lockstep interval (~30 steps per second)
pub const DEFAULT_STEP_LENGTH_MS: u64 = 33;
pub const DEFAULT_MIN_STEP_LENGTH_MS: u64 = 8;
pub const DEFAULT_MAX_STEP_LENGTH_MS: u64 = 100;

/// Lockstep pacing configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockstepConfig {
    /// Initial step length
    pub step_length_ms: u64,
    /// Lower bound for the step length
    pub min_step_length_ms: u64,
    /// Upper bound for the step length
    pub max_step_length_ms: u64,
}

impl Default for LockstepConfig {
    fn default() -> Self {
        LockstepConfig {
            step_length_ms: DEFAULT_STEP_LENGTH_MS,
            min_step_length_ms: DEFAULT_MIN_STEP_LENGTH_MS,
            max_step_length_ms: DEFAULT_MAX_STEP_LENGTH_MS,
        }
    }
}

/// Effective step length and the window it must stay in
/// INVARIANT: 1 <= min <= current <= max
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepLength {
    current: u64,
    min: u64,
    max: u64,
}

impl StepLength {
    /// Bounds are applied min first, then max, so a max below min wins
    pub fn new(current_ms: u64, min_ms: u64, max_ms: u64) -> Self {
        let mut step = StepLength {
            current: 1,
            min: 1,
            max: u64::MAX,
        };
        step.set_min(min_ms);
        step.set_max(max_ms);
        step.set(current_ms);
        step
    }

    /// Set the step length, clamped into the current bounds
    pub fn set(&mut self, ms: u64) {
        self.current = ms.clamp(self.min, self.max);
    }

    /// Set the lower bound, raising the upper bound if needed
    pub fn set_min(&mut self, ms: u64) {
        self.min = ms.max(1);
        if self.max < self.min {
            self.max = self.min;
        }
        self.set(self.current);
    }

    /// Set the upper bound, lowering the lower bound if needed
    pub fn set_max(&mut self, ms: u64) {
        self.max = ms.max(1);
        if self.min > self.max {
            self.min = self.max;
        }
        self.set(self.current);
    }

    pub fn current_ms(&self) -> u64 {
        self.current
    }

    pub fn min_ms(&self) -> u64 {
        self.min
    }

    pub fn max_ms(&self) -> u64 {
        self.max
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.current)
    }
}

impl Default for StepLength {
    fn default() -> Self {
        StepLength::from(&LockstepConfig::default())
    }
}

impl From<&LockstepConfig> for StepLength {
    fn from(config: &LockstepConfig) -> Self {
        StepLength::new(
            config.step_length_ms,
            config.min_step_length_ms,
            config.max_step_length_ms,
        )
    }
}
