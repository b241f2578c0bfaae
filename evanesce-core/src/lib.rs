//! # Evanesce Core
//!
//! A short-lived in-memory key/value store for one-time tokens, such as the
//! expected answer to a challenge.
//!
//! ## Features
//!
//! - [`Store`] trait so the backing implementation can be swapped
//! - [`MemoryStore`]: readers-writer locked maps with a fixed TTL
//! - Expired entries purged when read (lazy) and by background sweeps
//!   triggered after a configurable number of writes (eager)
//! - Three-way [`Lookup`] result that keeps "never existed" apart from
//!   "expired"
//! - Process-wide default store in [`global`]
//!
//! ## Example
//!
//! ```rust
//! use evanesce_core::{challenge, Lookup, MemoryStore, Store, StoreConfig};
//!
//! let store = MemoryStore::with_config(
//!     StoreConfig::default()
//!         .with_sweep_threshold(100)
//!         .with_ttl_secs(600),
//! );
//!
//! // Issue a challenge
//! store.set("9f2c", b"40271");
//!
//! // Peek without consuming it
//! assert!(store.get("9f2c", false).is_found());
//!
//! // Check the answer; the entry is gone afterwards
//! assert!(challenge::verify(&store, "9f2c", b"40271"));
//! assert_eq!(store.get("9f2c", false), Lookup::NotFound);
//! ```

pub mod challenge;
mod config;
mod error;
pub mod global;
mod lookup;
mod memory;
mod store;

pub use config::{StoreConfig, DEFAULT_SWEEP_THRESHOLD, DEFAULT_TTL};
pub use error::ConfigError;
pub use lookup::Lookup;
pub use memory::MemoryStore;
pub use store::Store;
