//! Effect Implementation
//!
//! An Effect is a re-runnable unit of reactive computation. Running it is
//! the sole mechanism by which subscriptions are created: while the
//! callback executes, every tracked read subscribes the effect to the
//! (source, key) pair that was read.
//!
//! # How Effects Work
//!
//! 1. When created (non-lazy), the effect runs immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the change propagator either re-runs
//!    the effect synchronously or hands it to its deferral handler.
//!
//! 3. Before re-running, the effect drops all of its old subscriptions
//!    and re-establishes them during execution, so a dependency read only
//!    on a branch not taken this time does not linger.
//!
//! # Stopping
//!
//! `stop` removes every subscription, fires the `on_stop` cleanup once,
//! and marks the effect inactive. Stopping is terminal. A stopped effect
//! can still be invoked through its handle as a plain function call; it
//! will not subscribe to anything.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::RunGuard;
use super::dep::{Dep, EffectId};
use super::runtime::Runtime;
use super::source::{AccessKind, Key, Mutation, SourceId};

/// Debug descriptor delivered to an `on_track` hook when the effect
/// subscribes to a (source, key) pair.
#[derive(Debug, Clone)]
pub struct TrackEvent {
    /// The effect that subscribed.
    pub effect: EffectId,
    /// The source that was read.
    pub source: SourceId,
    /// How the key was accessed.
    pub access: AccessKind,
    /// The key that was read.
    pub key: Key,
}

/// Debug descriptor delivered to an `on_trigger` hook when a mutation
/// notifies the effect.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    /// The effect being notified.
    pub effect: EffectId,
    /// The source that changed.
    pub source: SourceId,
    /// The mutation that caused the notification.
    pub mutation: Mutation,
}

type TrackHook = Box<dyn Fn(&TrackEvent) + Send + Sync>;
type TriggerHook = Box<dyn Fn(&TriggerEvent) + Send + Sync>;

/// What the change propagator does with an invalidated effect.
#[derive(Clone, Default)]
pub enum Invalidate {
    /// Re-run the effect synchronously, inline with the causing write.
    #[default]
    Immediate,

    /// Hand the effect to a deferral handler, which decides when and
    /// whether to actually run it. This is the engine's only batching
    /// and coalescing mechanism.
    Deferred(Arc<dyn Fn(&Effect) + Send + Sync>),
}

impl Invalidate {
    fn is_deferred(&self) -> bool {
        matches!(self, Invalidate::Deferred(_))
    }
}

impl fmt::Debug for Invalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invalidate::Immediate => f.write_str("Immediate"),
            Invalidate::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Configuration for an effect.
///
/// `EffectOptions::default()` gives an eager, synchronously re-run
/// effect with no hooks.
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the immediate first run.
    pub lazy: bool,

    /// Invalidation strategy.
    pub invalidate: Invalidate,

    /// Permit the effect to re-trigger itself from its own run.
    pub allow_recurse: bool,

    /// Cleanup invoked exactly once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce() + Send>>,

    /// Debug hook invoked when the effect subscribes. No-op outside
    /// debug builds.
    pub on_track: Option<TrackHook>,

    /// Debug hook invoked when a mutation notifies the effect. No-op
    /// outside debug builds.
    pub on_trigger: Option<TriggerHook>,
}

/// Shared state of one effect.
pub(crate) struct EffectInner {
    pub(crate) id: EffectId,
    pub(crate) runtime: Runtime,
    pub(crate) callback: Box<dyn Fn() + Send + Sync>,
    pub(crate) active: AtomicBool,
    pub(crate) allow_recurse: bool,
    pub(crate) invalidate: Invalidate,

    /// Subscriber sets this effect currently belongs to. Used only for
    /// bulk unsubscription; membership itself lives in the sets.
    deps: Mutex<SmallVec<[Dep; 4]>>,

    runs: AtomicU64,
    on_stop: Mutex<Option<Box<dyn FnOnce() + Send>>>,

    // Read only under debug_assertions; hooks are diagnostics, never on
    // the correctness path.
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    on_track: Option<TrackHook>,
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    on_trigger: Option<TriggerHook>,
}

impl EffectInner {
    /// Execute the effect.
    ///
    /// Inactive effects no-op when deferred, or run the raw callback
    /// (without a frame of their own, hence without subscribing). Active
    /// effects already on the running stack are skipped: an effect does
    /// not re-enter itself mid-run.
    pub(crate) fn run(this: &Arc<Self>) {
        if !this.active.load(Ordering::SeqCst) {
            if !this.invalidate.is_deferred() {
                (this.callback)();
            }
            return;
        }

        let ctx = this.runtime.tracking_state();
        if ctx.read().on_stack(this.id) {
            return;
        }

        // Drop stale subscriptions; the run below re-creates live ones.
        this.cleanup();

        this.runs.fetch_add(1, Ordering::Relaxed);
        let _guard = RunGuard::enter(ctx, Arc::clone(this));
        (this.callback)();
    }

    /// Remove this effect from every subscriber set it belongs to.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.lock());
        for dep in deps {
            dep.remove(self.id);
        }
    }

    /// Record membership in a subscriber set (the other half of the
    /// bidirectional link maintained by the registry).
    pub(crate) fn push_dep(&self, dep: Dep) {
        self.deps.lock().push(dep);
    }

    pub(crate) fn dep_count(&self) -> usize {
        self.deps.lock().len()
    }

    #[cfg(debug_assertions)]
    pub(crate) fn notify_track(&self, source: SourceId, access: AccessKind, key: &Key) {
        if let Some(hook) = &self.on_track {
            hook(&TrackEvent {
                effect: self.id,
                source,
                access,
                key: key.clone(),
            });
        }
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn notify_track(&self, _source: SourceId, _access: AccessKind, _key: &Key) {}

    #[cfg(debug_assertions)]
    pub(crate) fn notify_trigger(&self, source: SourceId, mutation: &Mutation) {
        if let Some(hook) = &self.on_trigger {
            hook(&TriggerEvent {
                effect: self.id,
                source,
                mutation: mutation.clone(),
            });
        }
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn notify_trigger(&self, _source: SourceId, _mutation: &Mutation) {}
}

/// Handle to a reactive effect.
///
/// Clones share state; the effect stays subscribed as long as any handle
/// (or the runtime's current notification pass) keeps it alive. Dropping
/// every handle without stopping silently retires the effect: subscriber
/// sets hold weak references, so it is never notified again.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// let count2 = count.clone();
/// let effect = rt.effect(move || {
///     println!("Count is: {}", count2.get());
/// });
///
/// count.set(5);    // Prints: "Count is: 5"
/// effect.stop();
/// count.set(9);    // Prints nothing
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Build an effect on the given runtime. Non-lazy effects run once
    /// immediately to establish their initial dependencies.
    pub(crate) fn new(
        runtime: &Runtime,
        callback: Box<dyn Fn() + Send + Sync>,
        options: EffectOptions,
    ) -> Self {
        let EffectOptions {
            lazy,
            invalidate,
            allow_recurse,
            on_stop,
            on_track,
            on_trigger,
        } = options;

        let inner = Arc::new(EffectInner {
            id: EffectId::new(),
            runtime: runtime.clone(),
            callback,
            active: AtomicBool::new(true),
            allow_recurse,
            invalidate,
            deps: Mutex::new(SmallVec::new()),
            runs: AtomicU64::new(0),
            on_stop: Mutex::new(on_stop),
            on_track,
            on_trigger,
        });

        let effect = Self { inner };
        if !lazy {
            effect.run();
        }
        effect
    }

    pub(crate) fn from_inner(inner: Arc<EffectInner>) -> Self {
        Self { inner }
    }

    /// Force a synchronous run.
    pub fn run(&self) {
        EffectInner::run(&self.inner);
    }

    /// Stop the effect: unsubscribe from everything, fire `on_stop`
    /// once, mark inactive. Terminal; there is no un-stop.
    pub fn stop(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            self.inner.cleanup();
            if let Some(cleanup) = self.inner.on_stop.lock().take() {
                cleanup();
            }
            tracing::trace!(effect = self.inner.id.raw(), "effect stopped");
        }
    }

    /// Get the effect's unique id.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Number of times the effect has executed with tracking.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.load(Ordering::Relaxed)
    }

    /// Number of subscriber sets the effect currently belongs to.
    pub fn dep_count(&self) -> usize {
        self.inner.dep_count()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .field("dep_count", &self.dep_count())
            .finish()
    }
}
