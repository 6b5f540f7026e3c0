use std::time::Duration;

use serde::Deserialize;

use chanpoll_core::error::{ChanpollError, Result};
use chanpoll_core::protocol::WireFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub engine: EngineSection,

    #[serde(default)]
    pub retry: RetrySection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ChanpollError::InvalidConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.engine.validate()?;
        self.retry.validate()?;

        Ok(())
    }
}

/// Per-engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    pub base_url: String,

    pub route: String,

    #[serde(default)]
    pub format: WireFormat,

    #[serde(default = "default_true")]
    pub reconnects: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Wait before the next cycle after a recoverable fault escaped the retry loop.
    #[serde(default = "default_recovery_delay_ms")]
    pub recovery_delay_ms: u64,

    /// Floor applied when the server asks for a zero poll delay.
    #[serde(default)]
    pub min_poll_delay_ms: u64,

    #[serde(default = "default_event_backlog")]
    pub event_backlog: usize,
}

impl EngineSection {
    /// Settings with defaults for everything but the endpoint.
    pub fn new(base_url: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            route: route.into(),
            format: WireFormat::default(),
            reconnects: true,
            request_timeout_ms: default_request_timeout_ms(),
            recovery_delay_ms: default_recovery_delay_ms(),
            min_poll_delay_ms: 0,
            event_backlog: default_event_backlog(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.route.trim().is_empty() {
            return Err(ChanpollError::InvalidConfig(
                "engine.route must not be empty".into(),
            ));
        }
        if !(1000..=300_000).contains(&self.request_timeout_ms) {
            return Err(ChanpollError::InvalidConfig(
                "engine.request_timeout_ms must be between 1000 and 300000".into(),
            ));
        }
        if self.recovery_delay_ms > 60_000 {
            return Err(ChanpollError::InvalidConfig(
                "engine.recovery_delay_ms must be at most 60000".into(),
            ));
        }
        if self.min_poll_delay_ms > 60_000 {
            return Err(ChanpollError::InvalidConfig(
                "engine.min_poll_delay_ms must be at most 60000".into(),
            ));
        }
        if !(1..=65_536).contains(&self.event_backlog) {
            return Err(ChanpollError::InvalidConfig(
                "engine.event_backlog must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}

fn default_true() -> bool {
    true
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_recovery_delay_ms() -> u64 {
    1000
}
fn default_event_backlog() -> usize {
    1024
}

/// Exponential backoff settings for the default retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_factor")]
    pub factor: f64,

    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.max_attempts) {
            return Err(ChanpollError::InvalidConfig(
                "retry.max_attempts must be between 1 and 100".into(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ChanpollError::InvalidConfig(
                "retry.max_delay_ms must be at least base_delay_ms".into(),
            ));
        }
        if self.factor.is_nan() || self.factor < 1.0 {
            return Err(ChanpollError::InvalidConfig(
                "retry.factor must be at least 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ChanpollError::InvalidConfig(
                "retry.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_factor() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}
