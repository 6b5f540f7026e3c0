//! Exponential backoff with jitter.
//!
//! Delay for failed attempt `n` is `min(base * factor^(n-1), max)` scaled by
//! a jitter factor in `[1 - jitter, 1 + jitter]`. The jitter source is a
//! deterministic function of the attempt number so schedules are
//! reproducible in tests.

use std::time::Duration;

use crate::config::RetrySection;

use super::RetryPolicy;

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration, factor: f64, jitter: f64, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            factor,
            jitter: jitter.clamp(0.0, 1.0),
            max_attempts,
        }
    }

    pub fn from_config(cfg: &RetrySection) -> Self {
        Self::new(
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_millis(cfg.max_delay_ms),
            cfg.factor,
            cfg.jitter,
            cfg.max_attempts,
        )
    }

    fn raw_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.factor.powi(exp);
        if !multiplier.is_finite() || self.base.as_secs_f64() * multiplier >= self.max.as_secs_f64() {
            return self.max;
        }
        self.base.mul_f64(multiplier)
    }

    // LCG step with POSIX-style constants, mapped into [0, 1).
    fn pseudo_random(attempt: u32) -> f64 {
        let hash = attempt.wrapping_mul(1_103_515_245).wrapping_add(12345);
        f64::from(hash % 100) / 100.0
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&RetrySection::default())
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = self.raw_delay(attempt);
        let jitter_factor = 1.0 - self.jitter + Self::pseudo_random(attempt) * 2.0 * self.jitter;
        Some(delay.mul_f64(jitter_factor))
    }
}
