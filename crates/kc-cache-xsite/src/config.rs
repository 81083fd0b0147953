//! Cross-site validation configuration.
//!
//! Values come from `KC_XSITE_*` environment variables (a `.env` file is
//! honoured) and may be overridden by the command line.

use std::str::FromStr;
use std::time::Duration;

use kc_cache::TierOptions;
use serde::{Deserialize, Serialize};

use crate::error::{XSiteError, XSiteResult};

/// Settings shared by both sites during a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XSiteConfig {
    /// Name of the session cache.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Number of sessions created and removed per run.
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Delay before the in-memory tier delivers change events.
    #[serde(default = "default_propagation_delay_ms")]
    pub propagation_delay_ms: u64,

    /// How long local caches get to converge after the removals.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Upper bound for draining queued events when a listener is removed.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Poll interval used while waiting for convergence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_cache_name() -> String {
    "sessions".to_string()
}

const fn default_iterations() -> usize {
    10_000
}

const fn default_propagation_delay_ms() -> u64 {
    5
}

const fn default_grace_period_ms() -> u64 {
    2_000
}

const fn default_drain_timeout_ms() -> u64 {
    2_000
}

const fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for XSiteConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            iterations: default_iterations(),
            propagation_delay_ms: default_propagation_delay_ms(),
            grace_period_ms: default_grace_period_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl XSiteConfig {
    /// Loads configuration from the environment.
    ///
    /// A `.env` file in the working directory is read first when present.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::Config`] if a variable is set but cannot be
    /// parsed, or if the resulting configuration is invalid.
    pub fn from_env() -> XSiteResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// ## Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> XSiteResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            cache_name: lookup("KC_XSITE_CACHE_NAME").unwrap_or_else(default_cache_name),
            iterations: parse_var(&lookup, "KC_XSITE_ITERATIONS", default_iterations())?,
            propagation_delay_ms: parse_var(
                &lookup,
                "KC_XSITE_PROPAGATION_DELAY_MS",
                default_propagation_delay_ms(),
            )?,
            grace_period_ms: parse_var(
                &lookup,
                "KC_XSITE_GRACE_PERIOD_MS",
                default_grace_period_ms(),
            )?,
            drain_timeout_ms: parse_var(
                &lookup,
                "KC_XSITE_DRAIN_TIMEOUT_MS",
                default_drain_timeout_ms(),
            )?,
            poll_interval_ms: parse_var(
                &lookup,
                "KC_XSITE_POLL_INTERVAL_MS",
                default_poll_interval_ms(),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the cache name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the event propagation delay.
    #[must_use]
    pub const fn with_propagation_delay_ms(mut self, ms: u64) -> Self {
        self.propagation_delay_ms = ms;
        self
    }

    /// Sets the convergence grace period.
    #[must_use]
    pub const fn with_grace_period_ms(mut self, ms: u64) -> Self {
        self.grace_period_ms = ms;
        self
    }

    /// Sets the listener drain timeout.
    #[must_use]
    pub const fn with_drain_timeout_ms(mut self, ms: u64) -> Self {
        self.drain_timeout_ms = ms;
        self
    }

    /// Sets the convergence poll interval.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Checks the configuration for values no run can work with.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::Config`] describing the first bad value.
    pub fn validate(&self) -> XSiteResult<()> {
        if self.cache_name.trim().is_empty() {
            return Err(XSiteError::Config("cache name must not be empty".to_string()));
        }
        if self.iterations == 0 {
            return Err(XSiteError::Config("iterations must be at least 1".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(XSiteError::Config(
                "poll interval must be at least 1ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Options for an in-memory tier built from this configuration.
    ///
    /// Delays below the tier minimum are raised to it by the tier.
    #[must_use]
    pub fn tier_options(&self) -> TierOptions {
        TierOptions {
            propagation_delay: Duration::from_millis(self.propagation_delay_ms),
            drain_timeout: self.drain_timeout(),
        }
    }

    /// Returns the grace period as a Duration.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Returns the drain timeout as a Duration.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Returns the poll interval as a Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> XSiteResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| XSiteError::Config(format!("{name} has an invalid value: {raw}"))),
    }
}
