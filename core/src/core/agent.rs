/// Reward-driven controller for the retry parameters.
///
/// Each epoch the agent samples an action by adding Gaussian noise to its
/// persistent `(delay, max_retries)`. After the epoch it pulls its state toward
/// that action, weighted by `learning_rate * reward`. Epochs with zero reward
/// leave the state untouched, so a target that blocks all traffic cannot drag
/// the policy toward whatever action happened to be sampled then.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::{EpochAction, MIN_DELAY, MIN_RETRIES};
use crate::error::{Result, TuneError};

pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_DELAY_NOISE: f64 = 0.1;
pub const DEFAULT_RETRIES_NOISE: f64 = 1.0;

const RANDOM_DELAY_MAX: f64 = 2.0;
const RANDOM_RETRIES_MAX: u32 = 5;

/// Persistent controller parameters.
///
/// `max_retries` is kept continuous so small updates accumulate; actions
/// round it to a whole retry count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub delay: f64,
    pub max_retries: f64,
    pub learning_rate: f64,
}

impl ControllerState {
    pub fn new(delay: f64, max_retries: f64, learning_rate: f64) -> Result<Self> {
        let mut state = Self { delay, max_retries, learning_rate };
        state.clamp();
        state.validate().map_err(TuneError::invalid)?;
        Ok(state)
    }

    /// Draws delay uniformly from `[0.1, 2.0)` and max_retries from `1..=5`.
    pub fn randomized<R: Rng + ?Sized>(rng: &mut R, learning_rate: f64) -> Result<Self> {
        let delay = rng.random_range(MIN_DELAY..RANDOM_DELAY_MAX);
        let max_retries = rng.random_range(MIN_RETRIES..=RANDOM_RETRIES_MAX);
        Self::new(delay, max_retries as f64, learning_rate)
    }

    /// Checks the invariants a restored state must satisfy.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.delay.is_finite() || self.delay < MIN_DELAY {
            return Err(format!("delay {} is below {}", self.delay, MIN_DELAY));
        }
        if !self.max_retries.is_finite() || self.max_retries < MIN_RETRIES as f64 {
            return Err(format!("max_retries {} is below {}", self.max_retries, MIN_RETRIES));
        }
        check_learning_rate(self.learning_rate)
    }

    /// The integer retry ceiling this state currently stands for.
    pub fn retry_ceiling(&self) -> u32 {
        to_retries(self.max_retries)
    }

    fn clamp(&mut self) {
        self.delay = self.delay.max(MIN_DELAY);
        self.max_retries = self.max_retries.max(MIN_RETRIES as f64);
    }
}

fn check_learning_rate(lr: f64) -> std::result::Result<(), String> {
    if lr > 0.0 && lr <= 1.0 {
        Ok(())
    } else {
        Err(format!("learning rate {} must be in (0, 1]", lr))
    }
}

fn to_retries(value: f64) -> u32 {
    // `as` saturates and maps NaN to 0; the floor takes care of the rest.
    (value.round() as u32).max(MIN_RETRIES)
}

pub struct ControllerAgent {
    state: ControllerState,
    delay_noise: Normal<f64>,
    retries_noise: Normal<f64>,
}

impl ControllerAgent {
    pub fn new(state: ControllerState) -> Result<Self> {
        Self::with_noise(state, DEFAULT_DELAY_NOISE, DEFAULT_RETRIES_NOISE)
    }

    /// Builds an agent whose action noise uses the given standard deviations.
    pub fn with_noise(state: ControllerState, delay_std: f64, retries_std: f64) -> Result<Self> {
        let delay_noise = Normal::new(0.0, delay_std)
            .map_err(|e| TuneError::invalid(format!("delay noise {}: {}", delay_std, e)))?;
        let retries_noise = Normal::new(0.0, retries_std)
            .map_err(|e| TuneError::invalid(format!("retries noise {}: {}", retries_std, e)))?;
        Ok(Self { state, delay_noise, retries_noise })
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Samples a perturbed action around the current state.
    pub fn choose_action<R: Rng + ?Sized>(&self, rng: &mut R) -> EpochAction {
        let delay = self.state.delay + self.delay_noise.sample(rng);
        let retries = to_retries(self.state.max_retries + self.retries_noise.sample(rng));
        EpochAction::new(delay, retries)
    }

    /// Moves the state toward `action` in proportion to `reward`.
    ///
    /// A non-positive reward is a no-op. Returns whether the state changed.
    pub fn update(&mut self, reward: f64, action: &EpochAction) -> bool {
        if reward.is_nan() || reward <= 0.0 {
            return false;
        }
        let step = self.state.learning_rate * reward.min(1.0);
        self.state.delay += step * (action.delay - self.state.delay);
        self.state.max_retries += step * (action.max_retries as f64 - self.state.max_retries);
        self.state.clamp();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn agent(delay: f64, retries: f64, lr: f64) -> ControllerAgent {
        ControllerAgent::new(ControllerState::new(delay, retries, lr).unwrap()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_learning_rate() {
        assert!(ControllerState::new(1.0, 3.0, 0.0).is_err());
        assert!(ControllerState::new(1.0, 3.0, 1.5).is_err());
        assert!(ControllerState::new(1.0, 3.0, f64::NAN).is_err());
        assert!(ControllerState::new(1.0, 3.0, 1.0).is_ok());
    }

    #[test]
    fn test_new_rejects_non_finite_values() {
        let cases = [
            (f64::INFINITY, 2.0),
            (1.0, f64::INFINITY),
            (f64::INFINITY, f64::INFINITY),
        ];
        for (delay, retries) in cases {
            let err = ControllerState::new(delay, retries, 0.1).unwrap_err();
            assert!(matches!(err, TuneError::InvalidConfiguration(_)));
        }
    }

    #[test]
    fn test_new_floors_nan_values() {
        let s = ControllerState::new(f64::NAN, f64::NAN, 0.1).unwrap();
        assert_eq!(s.delay, MIN_DELAY);
        assert_eq!(s.max_retries, 1.0);
    }

    #[test]
    fn test_new_applies_floors() {
        let s = ControllerState::new(0.0, 0.0, 0.5).unwrap();
        assert_eq!(s.delay, MIN_DELAY);
        assert_eq!(s.max_retries, 1.0);
    }

    #[test]
    fn test_randomized_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let s = ControllerState::randomized(&mut rng, 0.1).unwrap();
            assert!(s.delay >= MIN_DELAY && s.delay < RANDOM_DELAY_MAX);
            assert!(s.max_retries >= 1.0 && s.max_retries <= 5.0);
            assert_eq!(s.max_retries.fract(), 0.0);
            assert!(s.validate().is_ok());
        }
    }

    #[test]
    fn test_choose_action_respects_floors() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = agent(0.1, 1.0, 0.1);
        for _ in 0..1000 {
            let action = a.choose_action(&mut rng);
            assert!(action.delay >= MIN_DELAY);
            assert!(action.max_retries >= MIN_RETRIES);
        }
    }

    #[test]
    fn test_choose_action_with_huge_noise() {
        let mut rng = StdRng::seed_from_u64(2);
        let state = ControllerState::new(0.1, 1.0, 0.1).unwrap();
        let a = ControllerAgent::with_noise(state, 1e6, 1e6).unwrap();
        for _ in 0..1000 {
            let action = a.choose_action(&mut rng);
            assert!(action.delay >= MIN_DELAY);
            assert!(action.max_retries >= MIN_RETRIES);
        }
    }

    #[test]
    fn test_choose_action_does_not_mutate() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = agent(1.0, 3.0, 0.1);
        let before = *a.state();
        let _ = a.choose_action(&mut rng);
        assert_eq!(*a.state(), before);
    }

    #[test]
    fn test_zero_noise_reproduces_state() {
        let mut rng = StdRng::seed_from_u64(4);
        let state = ControllerState::new(0.75, 2.6, 0.1).unwrap();
        let a = ControllerAgent::with_noise(state, 0.0, 0.0).unwrap();
        assert_eq!(a.choose_action(&mut rng), EpochAction { delay: 0.75, max_retries: 3 });
    }

    #[test]
    fn test_negative_noise_rejected() {
        let state = ControllerState::new(1.0, 2.0, 0.1).unwrap();
        assert!(ControllerAgent::with_noise(state, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_zero_reward_is_noop() {
        let mut a = agent(1.3, 4.0, 0.7);
        let before = *a.state();
        assert!(!a.update(0.0, &EpochAction::new(5.0, 20)));
        assert_eq!(a.state().delay.to_bits(), before.delay.to_bits());
        assert_eq!(a.state().max_retries.to_bits(), before.max_retries.to_bits());
        assert_eq!(a.state().learning_rate.to_bits(), before.learning_rate.to_bits());
    }

    #[test]
    fn test_positive_reward_moves_toward_action() {
        let mut a = agent(1.0, 3.0, 0.5);
        assert!(a.update(0.8, &EpochAction::new(2.0, 7)));
        // step = 0.5 * 0.8 = 0.4
        assert!((a.state().delay - 1.4).abs() < 1e-12);
        assert!((a.state().max_retries - 4.6).abs() < 1e-12);
        assert_eq!(a.state().learning_rate, 0.5);
    }

    #[test]
    fn test_update_never_overshoots() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let lr = rng.random_range(0.01..0.99);
            let reward = rng.random_range(0.01..0.99);
            let mut a = agent(rng.random_range(0.1..5.0), rng.random_range(1.0..10.0), lr);
            let action = EpochAction::new(rng.random_range(0.1..5.0), rng.random_range(1..10));
            let old = *a.state();
            a.update(reward, &action);
            let new = a.state();

            let (lo, hi) = (old.delay.min(action.delay), old.delay.max(action.delay));
            assert!(new.delay >= lo && new.delay <= hi);
            let target = action.max_retries as f64;
            let (lo, hi) = (old.max_retries.min(target), old.max_retries.max(target));
            assert!(new.max_retries >= lo && new.max_retries <= hi);
        }
    }

    #[test]
    fn test_update_keeps_floors() {
        let mut a = agent(0.1, 1.0, 1.0);
        a.update(1.0, &EpochAction { delay: -10.0, max_retries: 0 });
        assert_eq!(a.state().delay, MIN_DELAY);
        assert_eq!(a.state().max_retries, 1.0);
    }

    #[test]
    fn test_full_step_lands_on_action() {
        let mut a = agent(1.0, 2.0, 1.0);
        a.update(1.0, &EpochAction::new(0.5, 6));
        assert_eq!(a.state().delay, 0.5);
        assert_eq!(a.state().max_retries, 6.0);
    }
}
