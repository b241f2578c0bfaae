use crate::lookup::Lookup;

/// Storage contract for ids and the values issued for them.
///
/// Implementations are responsible for discarding expired and consumed
/// entries on their own; callers never trigger cleanup. [`MemoryStore`] is the
/// default implementation, and any other backend can be plugged in through
/// [`global::replace`] as long as it keeps the same semantics.
///
/// [`MemoryStore`]: crate::MemoryStore
/// [`global::replace`]: crate::global::replace
pub trait Store: Send + Sync {
    /// Stores `value` under `id`, replacing any previous entry and restarting
    /// its lifetime.
    fn set(&self, id: &str, value: &[u8]);

    /// Looks up `id`.
    ///
    /// With `clear` set, a live entry is removed as part of being returned, so
    /// it can be read at most once. Without it the entry stays readable until
    /// it expires.
    fn get(&self, id: &str, clear: bool) -> Lookup;
}
