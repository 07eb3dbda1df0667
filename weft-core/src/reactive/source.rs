//! Source identity and the mutation vocabulary.
//!
//! The engine never owns observed objects. The observation layer
//! registers each source once, receives a stable [`SourceId`], and quotes
//! that id on every read and write it intercepts. Reclamation is manual:
//! when the source is disposed, the layer calls
//! [`Runtime::release_source`](super::Runtime::release_source).

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered source.
///
/// Ids are allocated from an atomic counter so they are unique across
/// runtimes as well as within one; a stale id quoted against the wrong
/// runtime simply misses its table and the operation becomes a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shape of a source, declared at registration.
///
/// The change propagator consults the kind when deciding which synthetic
/// subscriber sets a structural mutation affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A plain keyed object.
    Plain,

    /// An array-like source with integer indices and a length.
    Sequence,

    /// A keyed collection whose key-set is itself observable.
    Map,
}

/// How a tracked read accessed its key.
///
/// Carried on debug track events for diagnostics; never consulted when
/// deciding subscription membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// A plain value read.
    Get,

    /// An existence check.
    Has,

    /// An enumeration-style read.
    Iterate,
}

/// A property key within a source.
///
/// Keys include two synthetic members that let enumeration-style reads be
/// tracked even though they touch no single concrete key: [`Key::Iterate`]
/// stands for "this source's key-set/shape", [`Key::MapKeys`] for "this
/// map's key-set".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property.
    Prop(Cow<'static, str>),

    /// An integer element index of a sequence.
    Index(usize),

    /// A sequence's length.
    Length,

    /// Synthetic: the source's own key-set/shape.
    Iterate,

    /// Synthetic: a map's key-set.
    MapKeys,
}

impl Key {
    /// A named property key.
    pub fn prop(name: impl Into<Cow<'static, str>>) -> Self {
        Key::Prop(name.into())
    }

    /// The `"value"` property key used by signals and computed values.
    pub fn value() -> Self {
        Key::Prop(Cow::Borrowed("value"))
    }
}

/// Description of one mutation of a source.
///
/// This is the change propagator's entire input besides the source id.
/// The variant encodes the operation kind together with the only payload
/// propagation ever consults (the new length of a resized sequence);
/// values written or removed stay with the observation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// An existing key's value was replaced.
    Set {
        /// The key written.
        key: Key,
    },

    /// A key that did not exist before was created.
    Add {
        /// The key added.
        key: Key,
    },

    /// An existing key was removed.
    Delete {
        /// The key removed.
        key: Key,
    },

    /// A collection-like source was emptied wholesale.
    Clear,

    /// A sequence's length was written directly.
    Resize {
        /// The sequence's new length.
        new_len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_are_unique() {
        let id1 = SourceId::new();
        let id2 = SourceId::new();
        let id3 = SourceId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn prop_keys_compare_by_name() {
        assert_eq!(Key::prop("a"), Key::prop(String::from("a")));
        assert_ne!(Key::prop("a"), Key::prop("b"));
        assert_ne!(Key::prop("length"), Key::Length);
    }

    #[test]
    fn value_key_is_a_prop() {
        assert_eq!(Key::value(), Key::prop("value"));
    }
}
