//! Reconnect backoff configuration and delay calculation.
//!
//! The reconnect schedule grows geometrically from a base delay, is capped,
//! and then gets additive random jitter so a fleet of kiosks recovering from
//! the same outage does not reconnect in lockstep:
//!
//! - [`BackoffConfig`]: attempt budget, base/max delay, multiplier, jitter
//! - [`calculate_backoff_delay`]: the deterministic (jitter-free) floor
//! - [`calculate_backoff_delay_with_random`]: floor plus jitter from a supplied random

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 3000;
/// Default maximum (pre-jitter) delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default growth factor per attempt.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Default upper bound (exclusive) of the additive jitter in milliseconds.
pub const DEFAULT_MAX_JITTER_MS: u64 = 1000;

/// Configuration for the reconnect schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Reconnect attempts allowed after an abnormal closure (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in ms (default: 3000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap applied before jitter, in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per attempt (default: 1.5).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Additive jitter range `[0, max_jitter_ms)` in ms (default: 1000).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}
fn default_max_jitter_ms() -> u64 {
    DEFAULT_MAX_JITTER_MS
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
        }
    }
}

impl BackoffConfig {
    /// Jitter-free delay for a 1-based attempt number.
    pub fn min_delay_ms(&self, attempt: u32) -> u64 {
        calculate_backoff_delay(attempt, self.base_delay_ms, self.max_delay_ms, self.multiplier)
    }

    /// Delay for `attempt` using the supplied `random` in `[0.0, 1.0)`.
    pub fn delay_with_random(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.multiplier,
            self.max_jitter_ms,
            random,
        ))
    }

    /// Delay for `attempt` with jitter drawn from the thread RNG.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let random: f64 = rand::rng().random();
        self.delay_with_random(attempt, random)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate the capped geometric backoff delay without jitter.
///
/// Formula: `min(max_delay, floor(base_delay * multiplier^attempt))`
///
/// `attempt` is the 1-based reconnect attempt number, so with the defaults
/// the first retry waits 4500 ms and the fifth 22781 ms.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
) -> u64 {
    let exponent = attempt.min(1024) as i32;
    let grown = (base_delay_ms as f64) * multiplier.max(1.0).powi(exponent);
    let capped = grown.min(max_delay_ms as f64);
    capped.floor().max(0.0) as u64
}

/// Calculate the backoff delay with additive jitter.
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG; the jitter added
/// is `floor(random * max_jitter_ms)`, so the result never exceeds
/// `calculate_backoff_delay(..) + max_jitter_ms`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    max_jitter_ms: u64,
    random: f64,
) -> u64 {
    let floor = calculate_backoff_delay(attempt, base_delay_ms, max_delay_ms, multiplier);
    let random = random.clamp(0.0, 1.0);
    let jitter = ((max_jitter_ms as f64) * random).floor() as u64;
    floor.saturating_add(jitter.min(max_jitter_ms))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -- BackoffConfig --

    #[test]
    fn backoff_config_defaults() {
        let config = BackoffConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 3000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.max_jitter_ms, 1000);
    }

    #[test]
    fn backoff_config_serde_defaults() {
        let config: BackoffConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BackoffConfig::default());
    }

    #[test]
    fn backoff_config_camel_case_keys() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"maxAttempts": 2, "baseDelayMs": 100}"#).unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.base_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    // -- calculate_backoff_delay --

    #[test]
    fn default_schedule_for_five_attempts() {
        let config = BackoffConfig::default();
        let delays: Vec<u64> = (1..=5).map(|n| config.min_delay_ms(n)).collect();
        assert_eq!(delays, vec![4500, 6750, 10_125, 15_187, 22_781]);
    }

    #[test]
    fn schedule_is_strictly_increasing_until_cap() {
        let config = BackoffConfig::default();
        for n in 1..5 {
            assert!(config.min_delay_ms(n) < config.min_delay_ms(n + 1));
        }
    }

    #[test]
    fn backoff_caps_at_max() {
        assert_eq!(calculate_backoff_delay(6, 3000, 30_000, 1.5), 30_000);
        assert_eq!(calculate_backoff_delay(40, 3000, 30_000, 1.5), 30_000);
    }

    #[test]
    fn backoff_high_attempt_no_overflow() {
        assert_eq!(calculate_backoff_delay(u32::MAX, 3000, 30_000, 1.5), 30_000);
    }

    #[test]
    fn attempt_zero_is_base() {
        assert_eq!(calculate_backoff_delay(0, 3000, 30_000, 1.5), 3000);
    }

    // -- calculate_backoff_delay_with_random --

    #[test]
    fn random_zero_adds_no_jitter() {
        assert_eq!(calculate_backoff_delay_with_random(1, 3000, 30_000, 1.5, 1000, 0.0), 4500);
    }

    #[test]
    fn random_near_one_adds_almost_full_jitter() {
        let delay = calculate_backoff_delay_with_random(1, 3000, 30_000, 1.5, 1000, 0.9999);
        assert_eq!(delay, 5499);
    }

    #[test]
    fn jitter_applies_after_cap() {
        let delay = calculate_backoff_delay_with_random(20, 3000, 30_000, 1.5, 1000, 0.5);
        assert_eq!(delay, 30_500);
    }

    #[test]
    fn zero_jitter_range_is_deterministic() {
        let config = BackoffConfig { max_jitter_ms: 0, ..BackoffConfig::default() };
        assert_eq!(config.delay_for(2), Duration::from_millis(6750));
    }

    proptest! {
        #[test]
        fn delay_within_jitter_window(attempt in 1u32..=12, random in 0.0f64..1.0) {
            let config = BackoffConfig::default();
            let floor = config.min_delay_ms(attempt);
            let delay = config.delay_with_random(attempt, random).as_millis();
            prop_assert!(delay >= u128::from(floor));
            prop_assert!(delay <= u128::from(floor) + 1000);
            prop_assert!(delay <= 31_000);
        }

        #[test]
        fn sampled_delay_within_jitter_window(attempt in 1u32..=5) {
            let config = BackoffConfig::default();
            let floor = u128::from(config.min_delay_ms(attempt));
            let delay = config.delay_for(attempt).as_millis();
            prop_assert!(delay >= floor && delay <= floor + 1000);
        }
    }
}
