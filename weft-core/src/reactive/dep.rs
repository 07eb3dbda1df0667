//! Subscriber sets.
//!
//! A [`DepSet`] holds the effects subscribed to one (source, key) pair.
//! The same set is reachable from two directions: the registry maps the
//! pair to it, and every member effect keeps a handle to it in its deps
//! collection. That bidirectional link is what makes bulk unsubscription
//! (before a re-run, or on stop) O(deps) instead of a registry sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::effect::EffectInner;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shared handle to one subscriber set.
pub(crate) type Dep = Arc<DepSet>;

/// The set of effects subscribed to one (source, key) pair.
///
/// Entries hold weak references: an effect whose every handle was dropped
/// without an explicit stop must neither keep firing nor leak, so dead
/// entries are skipped on notification and pruned opportunistically.
pub(crate) struct DepSet {
    subscribers: RwLock<HashMap<EffectId, Weak<EffectInner>>>,
}

impl DepSet {
    pub(crate) fn new() -> Dep {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    /// Add an effect to the set. Returns false if it was already a member.
    pub(crate) fn insert(&self, effect: &Arc<EffectInner>) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.contains_key(&effect.id) {
            return false;
        }
        subscribers.insert(effect.id, Arc::downgrade(effect));
        true
    }

    /// Remove an effect from the set.
    pub(crate) fn remove(&self, id: EffectId) {
        self.subscribers.write().remove(&id);
    }

    /// Check whether an effect is currently a member.
    pub(crate) fn contains(&self, id: EffectId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Snapshot the live members, pruning entries whose effect is gone.
    pub(crate) fn live(&self) -> Vec<Arc<EffectInner>> {
        let mut saw_dead = false;
        let alive: Vec<_> = self
            .subscribers
            .read()
            .values()
            .filter_map(|weak| {
                let upgraded = weak.upgrade();
                saw_dead |= upgraded.is_none();
                upgraded
            })
            .collect();
        if saw_dead {
            self.subscribers
                .write()
                .retain(|_, weak| weak.strong_count() > 0);
        }
        alive
    }

    /// Number of live members.
    pub(crate) fn live_count(&self) -> usize {
        self.subscribers
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
