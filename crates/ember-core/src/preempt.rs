//! Out-of-band pre-emption notice subscription.
//!
//! Cloud platforms announce spot reclamation shortly before terminating the
//! instance. A watcher implementation subscribes to that mechanism and
//! cancels the provided token exactly once when the notice arrives.
//!
//! Subscription failure is expected off-cloud and merely disables the
//! trigger; the controller downgrades it to a warning.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PreemptError {
    #[error("termination-notice mechanism unavailable: {0}")]
    Unavailable(String),
}

/// "Notify once when the compute resource received a termination notice."
#[async_trait]
pub trait PreemptNotify: Send + Sync {
    /// Subscribe to the platform's termination notice.
    ///
    /// On success the implementation keeps watching in the background and
    /// cancels `notice` when the platform announces termination. Returns an
    /// error when the mechanism cannot be reached (e.g., not running on
    /// eligible infrastructure).
    async fn watch(&self, notice: CancellationToken) -> Result<(), PreemptError>;
}
