//! Reactive Engine
//!
//! This module implements the core reactive system: the dependency
//! registry, effects, change propagation, and computed values.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A source is any identity-bearing observable object owned by the
//! observation layer, not by this engine. The engine identifies sources
//! by a stable integer id handed out at registration, so the source's
//! lifetime is never extended; the observation layer releases the id when
//! the source is disposed.
//!
//! ## Effects
//!
//! An Effect is a re-runnable computation. While it runs, every tracked
//! read subscribes it to the (source, key) pair that was read. When any
//! of those pairs change, the effect re-runs (or is handed to a deferral
//! handler). Before each re-run the effect's previous subscriptions are
//! dropped, so dependencies from a branch not taken this time never
//! persist.
//!
//! ## Computed values
//!
//! A Computed is a derived value that caches its result. It recomputes
//! lazily, on read, and at most once per invalidation no matter how many
//! dependency changes occurred in between. A computed is also a source:
//! effects that read it are invalidated when it goes stale.
//!
//! # Implementation Notes
//!
//! All engine state lives in a [`Runtime`] value. Runtimes are
//! independent: two instances never observe each other's sources, which
//! keeps tests isolated and lets a process host several reactive worlds.
//! The runtime tracks the currently-executing effect on an explicit
//! stack, the approach used by SolidJS, Vue 3, and Leptos.

mod computed;
mod context;
mod dep;
mod effect;
mod error;
mod runtime;
mod signal;
mod source;

pub use computed::Computed;
pub use context::TrackingGuard;
pub use dep::EffectId;
pub use effect::{Effect, EffectOptions, Invalidate, TrackEvent, TriggerEvent};
pub use error::ReactiveError;
pub use runtime::Runtime;
pub use signal::Signal;
pub use source::{AccessKind, Key, Mutation, SourceId, SourceKind};
