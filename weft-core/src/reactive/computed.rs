//! Computed Implementation
//!
//! A Computed is a cached derived value that recomputes only when one of
//! its dependencies has changed, and only when somebody actually reads
//! it.
//!
//! # How Computeds Work
//!
//! 1. Construction wraps the getter in a lazy effect. Nothing runs yet.
//!
//! 2. The first read runs the effect, caching the result and subscribing
//!    the computed to everything the getter touched.
//!
//! 3. When a dependency changes, the effect's deferral handler flips the
//!    computed to dirty and, only on that first flip, triggers a write
//!    of the computed's own `"value"` key. Anything depending on the
//!    computed is invalidated in turn, without any getter running. This
//!    is how staleness propagates through chains of computeds.
//!
//! 4. The next read recomputes once, no matter how many invalidations
//!    arrived in between.
//!
//! A computed is itself a source: reads of `.get()` are tracked exactly
//! like reads of any observed object.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::effect::{Effect, EffectOptions, Invalidate};
use super::error::ReactiveError;
use super::runtime::Runtime;
use super::source::{AccessKind, Key, Mutation, SourceId, SourceKind};

type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

struct ComputedInner<T> {
    runtime: Runtime,
    source: SourceId,
    effect: Effect,

    /// Cache validity: the cached value may be read iff this is false.
    dirty: Arc<AtomicBool>,

    value: Arc<RwLock<Option<T>>>,
    setter: Option<Setter<T>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
        self.runtime.release_source(self.source);
    }
}

/// A lazily cached derived reactive value.
///
/// # Example
///
/// ```rust,ignore
/// let base = rt.signal(2);
///
/// let base2 = base.clone();
/// let doubled = rt.computed(move || base2.get() * 2);
///
/// assert_eq!(doubled.get(), 4);   // getter runs
/// assert_eq!(doubled.get(), 4);   // cached, getter does not run
///
/// base.set(5);                    // invalidates, does not recompute
/// assert_eq!(doubled.get(), 10);  // getter runs once
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        runtime: &Runtime,
        getter: Box<dyn Fn() -> T + Send + Sync>,
        setter: Option<Setter<T>>,
    ) -> Self {
        let source = runtime.register_source(SourceKind::Plain);
        let dirty = Arc::new(AtomicBool::new(true));
        let value = Arc::new(RwLock::new(None));

        // The wrapped effect refreshes the cache; reads inside the
        // getter subscribe it to the computed's dependencies.
        let cache = Arc::clone(&value);
        let callback = move || {
            *cache.write() = Some(getter());
        };

        // Invalidation flips to dirty and, only on the clean-to-dirty
        // edge, announces the computed's own value as written.
        let handler_dirty = Arc::clone(&dirty);
        let handler_rt = runtime.clone();
        let handler = move |_effect: &Effect| {
            if !handler_dirty.swap(true, Ordering::SeqCst) {
                handler_rt.trigger(source, Mutation::Set { key: Key::value() });
            }
        };

        let effect = Effect::new(
            runtime,
            Box::new(callback),
            EffectOptions {
                lazy: true,
                invalidate: Invalidate::Deferred(Arc::new(handler)),
                ..Default::default()
            },
        );

        Self {
            inner: Arc::new(ComputedInner {
                runtime: runtime.clone(),
                source,
                effect,
                dirty,
                value,
                setter,
            }),
        }
    }

    /// Read the computed's value, recomputing first if it is stale.
    ///
    /// The read is tracked: a running effect becomes a subscriber of the
    /// computed, whether or not a recomputation happened.
    pub fn get(&self) -> T {
        if self.inner.dirty.load(Ordering::SeqCst) {
            self.inner.effect.run();
            self.inner.dirty.store(false, Ordering::SeqCst);
        }

        self.inner
            .runtime
            .track(self.inner.source, AccessKind::Get, Key::value());

        self.inner
            .value
            .read()
            .clone()
            .expect("clean computed should have a cached value")
    }

    /// Write through the computed's setter.
    ///
    /// A computed constructed without a setter rejects the write: the
    /// value is untouched and the caller gets
    /// [`ReactiveError::ReadOnlyComputed`].
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                tracing::warn!(
                    source = self.inner.source.raw(),
                    "write to a read-only computed was discarded"
                );
                Err(ReactiveError::ReadOnlyComputed)
            }
        }
    }

    /// The computed's identity as a trackable source.
    pub fn source_id(&self) -> SourceId {
        self.inner.source
    }

    /// Whether the cache is currently invalid.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Whether a value has ever been computed.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("source", &self.inner.source)
            .field("dirty", &self.is_dirty())
            .field("has_value", &self.has_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn getter_is_lazy() {
        let rt = Runtime::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let computed = rt.computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!computed.has_value());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(computed.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn clean_reads_use_the_cache() {
        let rt = Runtime::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let computed = rt.computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependency_change_invalidates_without_recomputing() {
        let rt = Runtime::new();
        let base = rt.signal(2);
        let calls = Arc::new(AtomicI32::new(0));

        let base2 = base.clone();
        let calls_clone = calls.clone();
        let doubled = rt.computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            base2.get() * 2
        });

        assert_eq!(doubled.get(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Invalidate only; no eager recompute
        base.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(doubled.get(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn repeated_invalidations_coalesce() {
        let rt = Runtime::new();
        let base = rt.signal(1);
        let calls = Arc::new(AtomicI32::new(0));

        let base2 = base.clone();
        let calls_clone = calls.clone();
        let computed = rt.computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            base2.get() + 1
        });

        assert_eq!(computed.get(), 2);

        base.set(2);
        base.set(3);
        base.set(4);

        // Three changes, one recompute
        assert_eq!(computed.get(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writable_computed_routes_through_its_setter() {
        let rt = Runtime::new();
        let base = rt.signal(10);

        let get_base = base.clone();
        let set_base = base.clone();
        let plus_one = rt.computed_with_setter(
            move || get_base.get() + 1,
            move |v: i32| set_base.set(v - 1),
        );

        assert_eq!(plus_one.get(), 11);

        plus_one.set(21).unwrap();
        assert_eq!(base.get_untracked(), 20);
        assert_eq!(plus_one.get(), 21);
    }

    #[test]
    fn read_only_computed_rejects_writes() {
        let rt = Runtime::new();
        let computed = rt.computed(|| 7);

        assert_eq!(computed.get(), 7);
        assert_eq!(computed.set(99), Err(ReactiveError::ReadOnlyComputed));
        assert_eq!(computed.get(), 7);
    }

    #[test]
    fn drop_releases_the_computed_source() {
        let rt = Runtime::new();
        let computed = rt.computed(|| 1);
        let source = computed.source_id();
        assert!(rt.is_registered(source));

        drop(computed);
        assert!(!rt.is_registered(source));
    }
}
