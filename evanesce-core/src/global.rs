//! Process-wide default store.
//!
//! Code that does not want to thread a store handle through its call graph can
//! use the default store instead. It starts out as a [`MemoryStore`] with the
//! default configuration, created on first use, and can be swapped for any
//! other [`Store`] with [`replace`].
//!
//! Replacing the store only affects later calls to [`store`]. Handles obtained
//! earlier keep pointing at the instance they were given, so a replacement is
//! best done once during startup, before any ids are issued.

use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

use crate::memory::MemoryStore;
use crate::store::Store;

static DEFAULT_STORE: OnceLock<RwLock<Arc<dyn Store>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<dyn Store>> {
    DEFAULT_STORE.get_or_init(|| {
        tracing::debug!("initializing default memory store");
        RwLock::new(Arc::new(MemoryStore::new()))
    })
}

/// Returns the current default store
pub fn store() -> Arc<dyn Store> {
    Arc::clone(&slot().read())
}

/// Installs `store` as the default store and returns the one it replaces
pub fn replace(store: Arc<dyn Store>) -> Arc<dyn Store> {
    tracing::debug!("replacing default store");
    std::mem::replace(&mut *slot().write(), store)
}
