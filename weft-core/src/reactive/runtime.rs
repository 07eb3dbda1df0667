//! Reactive Runtime
//!
//! The runtime owns everything the engine shares: the dependency
//! registry (which effects subscribe to which (source, key) pairs) and
//! the tracking context (which effect is currently running). It is the
//! surface the observation layer calls into:
//!
//! 1. A source is registered once and identified by its [`SourceId`]
//!    from then on.
//!
//! 2. Every intercepted read calls [`Runtime::track`], subscribing the
//!    currently-running effect to the pair that was read.
//!
//! 3. Every intercepted write calls [`Runtime::trigger`], which computes
//!    the affected effects per the operation's rules and runs each
//!    (or hands it to its deferral handler).
//!
//! # Instances
//!
//! Runtimes are explicit values, not an implicit process-wide singleton.
//! Two instances share nothing: sources registered on one are invisible
//! to the other. Clones of one runtime share state.
//!
//! # Locking
//!
//! Execution is single-threaded and cooperative; locks exist so a
//! runtime may move between threads, not to support parallel mutation.
//! No lock is ever held while user code (an effect callback, a deferral
//! handler, a debug hook) runs: affected sets are snapshotted first,
//! then dispatched.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::computed::Computed;
use super::context::{TrackingGuard, TrackingState};
use super::dep::{Dep, DepSet, EffectId};
use super::effect::{Effect, EffectInner, EffectOptions, Invalidate};
use super::signal::Signal;
use super::source::{AccessKind, Key, Mutation, SourceId, SourceKind};

/// One registered source: its declared shape plus the subscriber set of
/// every key that has ever been tracked on it.
struct SourceEntry {
    kind: SourceKind,
    deps: IndexMap<Key, Dep>,
}

pub(crate) struct RuntimeInner {
    sources: RwLock<HashMap<SourceId, SourceEntry>>,
    ctx: Arc<RwLock<TrackingState>>,
}

/// Handle to a reactive runtime. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a new, independent runtime.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                sources: RwLock::new(HashMap::new()),
                ctx: Arc::new(RwLock::new(TrackingState::new())),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Source identity
    // ------------------------------------------------------------------

    /// Register an observable source, declaring its shape.
    ///
    /// The returned id is the source's identity for every later `track`
    /// and `trigger` call. The engine holds no reference to the source
    /// itself.
    pub fn register_source(&self, kind: SourceKind) -> SourceId {
        let id = SourceId::new();
        self.inner.sources.write().insert(
            id,
            SourceEntry {
                kind,
                deps: IndexMap::new(),
            },
        );
        id
    }

    /// Reclaim a source's registry entry.
    ///
    /// Called by the observation layer when the source is disposed.
    /// Unknown ids are ignored.
    pub fn release_source(&self, source: SourceId) {
        if self.inner.sources.write().remove(&source).is_some() {
            tracing::trace!(source = source.raw(), "source released");
        }
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Record that the currently-running effect depends on
    /// `(source, key)`.
    ///
    /// No-op if tracking is paused, no effect is running, or the source
    /// is unregistered. Otherwise the running effect is added to the
    /// key's subscriber set and the set to the effect's deps collection,
    /// keeping the two sides consistent.
    pub fn track(&self, source: SourceId, access: AccessKind, key: Key) {
        let frame = {
            let ctx = self.inner.ctx.read();
            if !ctx.is_tracking() {
                return;
            }
            match ctx.current() {
                Some(frame) => Arc::clone(frame),
                None => return,
            }
        };

        // An effect stopped from inside its own run keeps executing but
        // must not subscribe to anything further.
        if !frame.active.load(Ordering::SeqCst) {
            return;
        }

        let dep = {
            let mut sources = self.inner.sources.write();
            let Some(entry) = sources.get_mut(&source) else {
                return;
            };
            Arc::clone(entry.deps.entry(key.clone()).or_insert_with(DepSet::new))
        };

        if dep.insert(&frame) {
            frame.push_dep(Arc::clone(&dep));
            frame.notify_track(source, access, &key);
        }
    }

    // ------------------------------------------------------------------
    // Change propagation
    // ------------------------------------------------------------------

    /// Notify every effect affected by `mutation` on `source`.
    ///
    /// A source that was never registered or never tracked is a silent
    /// no-op; absence of subscribers is a normal, common case. Affected
    /// effects are deduplicated (an effect eligible via several rules is
    /// notified once) and dispatched in no particular order. Non-deferred
    /// effects are driven to completion before this returns.
    pub fn trigger(&self, source: SourceId, mutation: Mutation) {
        let affected = {
            let sources = self.inner.sources.read();
            let Some(entry) = sources.get(&source) else {
                return;
            };
            if entry.deps.is_empty() {
                return;
            }
            affected_deps(entry, &mutation)
        };
        if affected.is_empty() {
            return;
        }

        // Snapshot live subscribers before dispatch; nothing below holds
        // a registry lock.
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        for dep in affected {
            for effect in dep.live() {
                if seen.insert(effect.id) {
                    batch.push(effect);
                }
            }
        }

        let current = self.current_effect();
        tracing::trace!(
            source = source.raw(),
            affected = batch.len(),
            "trigger dispatch"
        );

        for effect in batch {
            // An earlier effect in the batch may have stopped this one.
            if !effect.active.load(Ordering::SeqCst) {
                continue;
            }
            // An effect does not synchronously re-enter itself mid-run
            // unless it opted into recursion.
            if current == Some(effect.id) && !effect.allow_recurse {
                continue;
            }
            effect.notify_trigger(source, &mutation);
            match &effect.invalidate {
                Invalidate::Deferred(handler) => {
                    let handle = Effect::from_inner(Arc::clone(&effect));
                    handler(&handle);
                }
                Invalidate::Immediate => EffectInner::run(&effect),
            }
        }
    }

    // ------------------------------------------------------------------
    // Tracking context control
    // ------------------------------------------------------------------

    /// Suspend dependency tracking until the guard drops.
    pub fn pause_tracking(&self) -> TrackingGuard {
        TrackingGuard::acquire(Arc::clone(&self.inner.ctx), false)
    }

    /// Force-enable dependency tracking until the guard drops.
    pub fn enable_tracking(&self) -> TrackingGuard {
        TrackingGuard::acquire(Arc::clone(&self.inner.ctx), true)
    }

    /// Run a closure with tracking suspended.
    ///
    /// Reads inside the closure do not create subscriptions. Useful for
    /// one-shot reads inside an effect that must not become dependencies.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.pause_tracking();
        f()
    }

    /// Whether reads currently establish subscriptions.
    pub fn is_tracking(&self) -> bool {
        self.inner.ctx.read().is_tracking()
    }

    /// The innermost currently-running effect, if any.
    pub fn current_effect(&self) -> Option<EffectId> {
        self.inner.ctx.read().current().map(|frame| frame.id)
    }

    pub(crate) fn tracking_state(&self) -> Arc<RwLock<TrackingState>> {
        Arc::clone(&self.inner.ctx)
    }

    // ------------------------------------------------------------------
    // Constructors for the reactive primitives
    // ------------------------------------------------------------------

    /// Register a reactive effect. Runs it once immediately.
    pub fn effect<F>(&self, callback: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::new(self, Box::new(callback), EffectOptions::default())
    }

    /// Register a reactive effect with explicit options.
    pub fn effect_with_options<F>(&self, callback: F, options: EffectOptions) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        Effect::new(self, Box::new(callback), options)
    }

    /// Create a read-only computed value.
    pub fn computed<T, G>(&self, getter: G) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        G: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter), None)
    }

    /// Create a writable computed value.
    ///
    /// The setter receives written values; any invalidation flows back
    /// through the normal track/trigger path from whatever sources the
    /// setter mutates.
    pub fn computed_with_setter<T, G, S>(&self, getter: G, setter: S) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Computed::new(self, Box::new(getter), Some(Box::new(setter)))
    }

    /// Create a signal holding `value`.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Signal::new(self, value)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of live subscribers of `(source, key)`.
    pub fn subscriber_count(&self, source: SourceId, key: &Key) -> usize {
        self.inner
            .sources
            .read()
            .get(&source)
            .and_then(|entry| entry.deps.get(key))
            .map(|dep| dep.live_count())
            .unwrap_or(0)
    }

    /// Whether a source id is currently registered.
    pub fn is_registered(&self, source: SourceId) -> bool {
        self.inner.sources.read().contains_key(&source)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect the subscriber sets affected by one mutation.
///
/// Rules, deduplicated by the caller:
/// 1. `Clear`: every set of the source.
/// 2. `Resize` on a sequence: the `Length` set plus every `Index(i)` set
///    with `i >= new_len` (shrinking invalidates trailing-index readers).
///    On a non-sequence the resize degrades to a plain write of `Length`.
/// 3. `Set`/`Add`/`Delete {key}`: the set exactly matching `key`, plus
///    the synthetic sets of any key-set change: `Add`/`Delete` on a
///    non-sequence affect `Iterate` (and `MapKeys` on a map); `Add` of an
///    index on a sequence affects `Length`; `Set` on a map affects
///    `Iterate`.
fn affected_deps(entry: &SourceEntry, mutation: &Mutation) -> Vec<Dep> {
    fn push(affected: &mut Vec<Dep>, entry: &SourceEntry, key: &Key) {
        if let Some(dep) = entry.deps.get(key) {
            affected.push(Arc::clone(dep));
        }
    }

    let mut affected = Vec::new();
    match mutation {
        Mutation::Clear => {
            affected.extend(entry.deps.values().cloned());
        }
        Mutation::Resize { new_len } => {
            if entry.kind == SourceKind::Sequence {
                for (key, dep) in &entry.deps {
                    let hit = match key {
                        Key::Length => true,
                        Key::Index(i) => *i >= *new_len,
                        _ => false,
                    };
                    if hit {
                        affected.push(Arc::clone(dep));
                    }
                }
            } else {
                push(&mut affected, entry, &Key::Length);
            }
        }
        Mutation::Set { key } => {
            push(&mut affected, entry, key);
            if entry.kind == SourceKind::Map {
                push(&mut affected, entry, &Key::Iterate);
            }
        }
        Mutation::Add { key } => {
            push(&mut affected, entry, key);
            if entry.kind == SourceKind::Sequence {
                if matches!(key, Key::Index(_)) {
                    push(&mut affected, entry, &Key::Length);
                }
            } else {
                push(&mut affected, entry, &Key::Iterate);
                if entry.kind == SourceKind::Map {
                    push(&mut affected, entry, &Key::MapKeys);
                }
            }
        }
        Mutation::Delete { key } => {
            push(&mut affected, entry, key);
            if entry.kind != SourceKind::Sequence {
                push(&mut affected, entry, &Key::Iterate);
                if entry.kind == SourceKind::Map {
                    push(&mut affected, entry, &Key::MapKeys);
                }
            }
        }
    }

    affected
}
