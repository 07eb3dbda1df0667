//! Engine error types.

use thiserror::Error;

/// Errors reported by the reactive engine.
///
/// The engine is deliberately permissive: unknown sources and absent
/// subscribers are normal no-ops, not errors. What remains is the one
/// misuse a caller can meaningfully handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A value was written to a computed constructed without a setter.
    #[error("computed value is read-only")]
    ReadOnlyComputed,
}
