//! Error types for store construction.

use thiserror::Error;

/// Errors raised when a [`StoreConfig`](crate::StoreConfig) cannot be used to
/// build a store.
///
/// Reads and writes never fail; misconfiguration is the only error the crate
/// reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The sweep threshold must allow at least one write between sweeps
    #[error("sweep threshold must be greater than zero")]
    ZeroSweepThreshold,

    /// Entries with a zero TTL would be expired as soon as they are written
    #[error("TTL must be greater than zero")]
    ZeroTtl,
}
