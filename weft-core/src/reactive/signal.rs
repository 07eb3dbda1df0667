//! Signal Implementation
//!
//! A Signal is a typed value holder backed by the engine: the smallest
//! possible observed source. Reads track its single `"value"` key, writes
//! trigger it. The full observation layer (proxies over arbitrary
//! objects) lives outside this crate; signals exist so the engine has a
//! first-class primitive holder and so tests can exercise the whole
//! track/trigger path without one.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::Runtime;
use super::source::{AccessKind, Key, Mutation, SourceId, SourceKind};

struct SignalInner<T> {
    runtime: Runtime,
    source: SourceId,
    value: RwLock<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.release_source(self.source);
    }
}

/// A reactive value holder.
///
/// Clones share the same value and source identity.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// // Read the value (tracked inside an effect)
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(runtime: &Runtime, value: T) -> Self {
        let source = runtime.register_source(SourceKind::Plain);
        Self {
            inner: Arc::new(SignalInner {
                runtime: runtime.clone(),
                source,
                value: RwLock::new(value),
            }),
        }
    }

    /// Get the current value.
    ///
    /// If an effect is running, it becomes a subscriber of this signal.
    pub fn get(&self) -> T {
        self.inner
            .runtime
            .track(self.inner.source, AccessKind::Get, Key::value());
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            *guard = value;
        }
        self.inner
            .runtime
            .trigger(self.inner.source, Mutation::Set { key: Key::value() });
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// The signal's identity as a trackable source.
    pub fn source_id(&self) -> SourceId {
        self.inner.source
    }

    /// Number of live subscribers of this signal.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .subscriber_count(self.inner.source, &Key::value())
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Signal<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("source", &self.inner.source)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
