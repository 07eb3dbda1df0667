//! Tracking Context
//!
//! The tracking context records which effect is currently executing and
//! whether dependency tracking is enabled at all. When a source is read,
//! the registry consults this state to decide whom to subscribe.
//!
//! # Implementation
//!
//! The context is owned by its runtime rather than hidden in global
//! state: a stack of running effects (supporting nested runs, e.g. a
//! computed refreshed from inside an effect) plus a tracking flag with a
//! stack of saved values (supporting temporary suspension).
//!
//! Suspension is deliberately a stack, not a counter, so every pause or
//! enable must be balanced by exactly one reset in reverse order. Both
//! operations are therefore exposed only through guards whose `Drop`
//! performs the reset, which keeps the pairing intact on every exit path,
//! panics included.

use std::sync::Arc;

use parking_lot::RwLock;

use super::dep::EffectId;
use super::effect::EffectInner;

/// Mutable tracking state of one runtime.
pub(crate) struct TrackingState {
    /// Stack of currently-executing effects, innermost last.
    frames: Vec<Arc<EffectInner>>,

    /// Whether reads currently establish subscriptions.
    tracking: bool,

    /// Saved values of `tracking`, restored LIFO by `reset`.
    saved: Vec<bool>,
}

impl TrackingState {
    pub(crate) fn new() -> Self {
        Self {
            frames: Vec::new(),
            tracking: true,
            saved: Vec::new(),
        }
    }

    /// The innermost running effect, if any.
    pub(crate) fn current(&self) -> Option<&Arc<EffectInner>> {
        self.frames.last()
    }

    /// Whether reads currently establish subscriptions.
    pub(crate) fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Check whether an effect is anywhere on the running stack.
    pub(crate) fn on_stack(&self, id: EffectId) -> bool {
        self.frames.iter().any(|frame| frame.id == id)
    }

    /// Save the current tracking flag and set a new value.
    fn push_tracking(&mut self, enabled: bool) {
        self.saved.push(self.tracking);
        self.tracking = enabled;
    }

    /// Restore the most recently saved tracking flag.
    ///
    /// An empty save-stack restores the default (enabled).
    fn reset_tracking(&mut self) {
        self.tracking = self.saved.pop().unwrap_or(true);
    }
}

/// Guard that restores the previous tracking flag when dropped.
///
/// Returned by [`Runtime::pause_tracking`](super::Runtime::pause_tracking)
/// and [`Runtime::enable_tracking`](super::Runtime::enable_tracking).
#[must_use = "tracking state is restored when the guard is dropped"]
pub struct TrackingGuard {
    ctx: Arc<RwLock<TrackingState>>,
}

impl TrackingGuard {
    pub(crate) fn acquire(ctx: Arc<RwLock<TrackingState>>, enabled: bool) -> Self {
        ctx.write().push_tracking(enabled);
        Self { ctx }
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        self.ctx.write().reset_tracking();
    }
}

/// Guard scoping one effect execution.
///
/// Entering pushes the effect onto the running stack and enables
/// tracking; dropping pops the frame and restores the prior flag, even if
/// the effect's callback panicked.
pub(crate) struct RunGuard {
    ctx: Arc<RwLock<TrackingState>>,
    effect_id: EffectId,
}

impl RunGuard {
    pub(crate) fn enter(ctx: Arc<RwLock<TrackingState>>, effect: Arc<EffectInner>) -> Self {
        let effect_id = effect.id;
        {
            let mut state = ctx.write();
            state.push_tracking(true);
            state.frames.push(effect);
        }
        Self { ctx, effect_id }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut state = self.ctx.write();
        let popped = state.frames.pop();

        // Verify we're popping the right frame.
        // This helps catch bugs where guards are mismatched.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.id, self.effect_id,
                "RunGuard mismatch: expected {:?}, got {:?}",
                self.effect_id, frame.id
            );
        }

        state.reset_tracking();
    }
}
