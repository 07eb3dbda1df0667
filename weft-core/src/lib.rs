//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive state
//! framework: a fine-grained dependency-tracking engine that records, for
//! every piece of observable state, which computations read it, and
//! re-invokes (or marks stale) exactly those computations when the state
//! changes.
//!
//! It implements:
//!
//! - A per-runtime dependency registry keyed by (source, property key)
//! - Effect lifecycle (run, stop, stale-subscription pruning)
//! - Change propagation with per-operation affected-set rules
//! - Lazily cached computed values with transitive invalidation
//!
//! The object-observation layer (proxies, interception of reads and
//! writes on plain objects) is an external collaborator. It talks to this
//! crate through [`reactive::Runtime::track`] and
//! [`reactive::Runtime::trigger`] and is otherwise out of scope here.
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal (a typed value holder backed by the engine)
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let count2 = count.clone();
//! let doubled = rt.computed(move || count2.get() * 2);
//!
//! // Create an effect
//! let count3 = count.clone();
//! let _effect = rt.effect(move || {
//!     println!("Count: {}", count3.get());
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect re-runs synchronously, prints: "Count: 5"
//! assert_eq!(doubled.get(), 10);
//! ```

pub mod reactive;
