//! History verifier capability.

use std::path::Path;

/// Decides whether a recorded history is acceptable (e.g. linearizable).
///
/// Verification can take a long time, so the caller runs it off the async
/// runtime.
pub trait Verifier: Send + Sync {
    /// Returns `Ok(true)` when the history at `history` passes.
    fn verify(&self, history: &Path) -> anyhow::Result<bool>;
}
