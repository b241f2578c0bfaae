use std::sync::Arc;

/// Outcome of reading an id from a [`Store`](crate::Store)
///
/// `NotFound` and `Expired` both mean "no usable value", but they are kept
/// apart so callers can tell a stale token from one that never existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The id was never written, or its entry has already been deleted
    NotFound,
    /// The id was written but its entry outlived the TTL; it has been purged
    Expired,
    /// The id is live; holds a shared handle to the stored bytes
    Found(Arc<[u8]>),
}

impl Lookup {
    /// Returns `true` for [`Lookup::Found`]
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Returns `true` for [`Lookup::Expired`]
    pub fn is_expired(&self) -> bool {
        matches!(self, Lookup::Expired)
    }

    /// Returns `true` for [`Lookup::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }

    /// Borrows the stored bytes if the entry was found
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the outcome, returning the stored bytes if the entry was found
    pub fn into_value(self) -> Option<Arc<[u8]>> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}
