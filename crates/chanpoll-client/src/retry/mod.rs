//! Retry policy contract and the attempt driver.
//!
//! A [`RetryPolicy`] only decides spacing and limits. [`retry`] runs the
//! attempt loop, consults the fault's recoverability, and reports progress
//! through [`RetryHooks`].

pub mod backoff;
pub mod driver;

use std::time::Duration;

pub use backoff::ExponentialBackoff;
pub use driver::{retry, AttemptError, NoHooks, RetryHooks};

/// Attempt spacing and limits.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the attempt following failed attempt `attempt` (1-based),
    /// or `None` to give up.
    fn delay_for(&self, attempt: u32) -> Option<Duration>;
}

/// Single attempt, never retries. Used when reconnects are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn delay_for(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}
