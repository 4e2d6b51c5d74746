//! Typed engine configuration.
//!
//! Defaults suit tests and embedded use; `from_env` loads operator
//! overrides once at startup and fails fast on unparsable values.

use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Failed attempts before an entry escalates to manual handling.
    pub max_attempts: u32,
    /// Quiet period that settles a burst of capacity events.
    pub debounce_window: Duration,
    /// Claims older than this revert to pending (crashed-pass recovery).
    pub stale_claim_timeout: Duration,
    /// How often the background sweeper looks for stale claims.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            debounce_window: Duration::from_millis(250),
            stale_claim_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_attempts: parsed_var("ASSIGNQ_MAX_ATTEMPTS", defaults.max_attempts)?,
            debounce_window: Duration::from_millis(parsed_var(
                "ASSIGNQ_DEBOUNCE_MS",
                defaults.debounce_window.as_millis() as u64,
            )?),
            stale_claim_timeout: Duration::from_secs(parsed_var(
                "ASSIGNQ_STALE_CLAIM_SECS",
                defaults.stale_claim_timeout.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(parsed_var(
                "ASSIGNQ_SWEEP_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
        })
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} has unparsable value: {raw}"))),
        Err(_) => Ok(default),
    }
}
