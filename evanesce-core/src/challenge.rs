//! Challenge/response helpers built on the [`Store`] contract.
//!
//! A challenge issuer stores the expected answer under a fresh id, hands the
//! id to the client, and later checks the client's answer with [`verify`].
//! Every verification consumes the entry, so an id can be answered once.

use subtle::ConstantTimeEq;

use crate::lookup::Lookup;
use crate::store::Store;

/// Checks `answer` against the value stored for `id`, consuming the entry.
///
/// Returns `false` for an empty answer without touching the store. Otherwise
/// the entry is removed whether or not the answer matches, and `true` is
/// returned only for a live entry whose value equals `answer`. The comparison
/// runs in constant time for equal-length inputs.
pub fn verify(store: &dyn Store, id: &str, answer: &[u8]) -> bool {
    if answer.is_empty() {
        return false;
    }

    match store.get(id, true) {
        Lookup::Found(expected) => expected.as_ref().ct_eq(answer).into(),
        Lookup::Expired => {
            tracing::debug!("challenge answered after expiry");
            false
        }
        Lookup::NotFound => false,
    }
}

/// Replaces the value of a live entry with `fresh`, restarting its lifetime.
///
/// Returns `false`, and writes nothing, if `id` is unknown or expired when it
/// is checked.
///
/// The check and the write are separate store calls. A [`verify`] on the same
/// id that lands between them consumes the old entry, and the write then
/// stores `fresh` under the id again. Callers that need reload to be exclusive
/// with verification must serialize them per id.
pub fn reload(store: &dyn Store, id: &str, fresh: &[u8]) -> bool {
    if !store.get(id, false).is_found() {
        return false;
    }
    store.set(id, fresh);
    true
}
