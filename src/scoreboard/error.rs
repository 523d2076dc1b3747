use std::time::Duration;

use thiserror::Error;

/// Failures a scoreboard call can surface.
///
/// A missing key is not an error: `read` returns `Ok(None)` for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreboardError {
    /// The owning task has exited; the submission was never serviced.
    #[error("scoreboard owner has shut down")]
    ShutDown,

    /// The inbox is at capacity and the caller asked not to wait.
    #[error("scoreboard inbox is full")]
    Busy,

    /// A bounded read did not complete in time.
    #[error("scoreboard read timed out after {0:?}")]
    TimedOut(Duration),
}
