use std::time::Duration;

use crate::error::ConfigError;

/// Default number of writes between background sweeps
pub const DEFAULT_SWEEP_THRESHOLD: usize = 100;

/// Default time-to-live for entries (10 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Configuration for a [`MemoryStore`](crate::MemoryStore)
///
/// # Example
///
/// ```rust
/// use evanesce_core::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_sweep_threshold(50)
///     .with_ttl_secs(120);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of writes that triggers a background sweep (default: 100)
    pub sweep_threshold: usize,
    /// How long an entry stays valid after its last write (default: 10 minutes)
    pub ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            ttl: DEFAULT_TTL,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of writes between sweeps
    ///
    /// Once more than `threshold` writes have happened since the last sweep,
    /// the next write schedules a new one in the background.
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Sets the entry time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the entry time-to-live in whole seconds
    pub fn with_ttl_secs(self, seconds: u64) -> Self {
        self.with_ttl(Duration::from_secs(seconds))
    }

    /// Create a configuration from environment variables.
    ///
    /// Reads:
    /// - `EVANESCE_SWEEP_THRESHOLD` - writes between sweeps (defaults to 100)
    /// - `EVANESCE_TTL_SECONDS` - entry TTL in seconds (defaults to 600)
    ///
    /// Missing or unparseable values fall back to the defaults. The result is
    /// not validated; a zero read from the environment is reported when the
    /// store is built.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let sweep_threshold = std::env::var("EVANESCE_SWEEP_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sweep_threshold);
        let ttl = std::env::var("EVANESCE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.ttl);

        Self { sweep_threshold, ttl }
    }

    /// Checks that both the threshold and the TTL are positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_threshold == 0 {
            return Err(ConfigError::ZeroSweepThreshold);
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(())
    }
}
