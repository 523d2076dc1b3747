//! Concurrent name → score store with two interchangeable backends.
//!
//! ```text
//!  callers ──submit closure──▶ inbox ──▶ owning task (sole mutator)   [channel]
//!  callers ──read/write lock──▶ Arc<RwLock<HashMap>>                  [lock]
//! ```
//!
//! Both backends honour the same contract: every key holds the value of the
//! most recently completed `update` for it, and no `read` observes a value
//! older than an `update` that completed before the read began.

pub mod channel;
pub mod error;
pub mod lock;

pub use channel::{ChannelConfig, ChannelScoreboard, ShutdownHandle};
pub use error::ScoreboardError;
pub use lock::LockScoreboard;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Score stored against each name.
pub type Score = i64;

/// Contract shared by every scoreboard backend.
#[async_trait]
pub trait Scoreboard: Send + Sync {
    /// Which backend this is, for logging and reports.
    fn backend(&self) -> Backend;

    /// Set `name` to `value`, replacing any previous score.
    async fn update(&self, name: &str, value: Score) -> Result<(), ScoreboardError>;

    /// Like `update`, but fails with [`ScoreboardError::Busy`] instead of
    /// waiting when the backend cannot take the write right now.
    fn try_update(&self, name: &str, value: Score) -> Result<(), ScoreboardError>;

    /// Current score for `name`, or `None` if it was never written.
    async fn read(&self, name: &str) -> Result<Option<Score>, ScoreboardError>;
}

/// Available scoreboard implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single owning task fed through an mpsc inbox.
    Channel,
    /// Shared map behind a reader/writer lock.
    Lock,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Channel, Backend::Lock];

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Channel => "channel",
            Backend::Lock => "lock",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a fresh, empty scoreboard of the requested kind.
///
/// The channel backend also returns the handle that stops its owning task;
/// the lock backend has no teardown step.
pub fn open(
    backend: Backend,
    config: &ChannelConfig,
) -> (Arc<dyn Scoreboard>, Option<ShutdownHandle>) {
    match backend {
        Backend::Channel => {
            let (board, shutdown) = ChannelScoreboard::new(config);
            (Arc::new(board), Some(shutdown))
        }
        Backend::Lock => (Arc::new(LockScoreboard::new()), None),
    }
}

/// Read with an upper bound on how long the caller is willing to wait.
pub async fn read_with_timeout(
    board: &dyn Scoreboard,
    name: &str,
    limit: Duration,
) -> Result<Option<Score>, ScoreboardError> {
    match tokio::time::timeout(limit, board.read(name)).await {
        Ok(result) => result,
        Err(_) => Err(ScoreboardError::TimedOut(limit)),
    }
}
