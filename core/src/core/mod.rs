pub mod agent;
pub mod dispatcher;
pub mod history;
pub mod retry;
pub mod state;
pub mod trainer;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound on the inter-retry delay, in seconds.
pub const MIN_DELAY: f64 = 0.1;
/// Lower bound on the retry ceiling.
pub const MIN_RETRIES: u32 = 1;

/// The `(delay, max_retries)` pair used for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochAction {
    pub delay: f64,
    pub max_retries: u32,
}

impl EpochAction {
    /// Builds an action with both floors applied.
    pub fn new(delay: f64, max_retries: u32) -> Self {
        Self {
            delay: delay.max(MIN_DELAY),
            max_retries: max_retries.max(MIN_RETRIES),
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay).unwrap_or(Duration::MAX)
    }
}

/// Outcome of one dispatcher round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochResult {
    pub success_count: usize,
    pub request_count: usize,
}

impl EpochResult {
    pub fn new(success_count: usize, request_count: usize) -> Self {
        Self {
            success_count: success_count.min(request_count),
            request_count,
        }
    }

    /// Success ratio in `[0, 1]`.
    pub fn reward(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.request_count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_floors() {
        let a = EpochAction::new(-3.0, 0);
        assert_eq!(a.delay, MIN_DELAY);
        assert_eq!(a.max_retries, MIN_RETRIES);
        assert_eq!(EpochAction::new(f64::NAN, 2).delay, MIN_DELAY);
    }

    #[test]
    fn test_reward_bounds() {
        assert_eq!(EpochResult::new(0, 10).reward(), 0.0);
        assert_eq!(EpochResult::new(10, 10).reward(), 1.0);
        assert_eq!(EpochResult::new(5, 10).reward(), 0.5);
        assert_eq!(EpochResult::new(12, 10).success_count, 10);
    }
}
