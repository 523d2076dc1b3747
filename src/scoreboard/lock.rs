//! Scoreboard backed by a shared map behind a tokio reader/writer lock.
//!
//! Readers share the lock with each other; a writer excludes everyone. Guards
//! are dropped at the end of each call, so the lock is released on every exit
//! path. There is no teardown: the map goes away with its last handle.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use super::{Backend, Score, Scoreboard, ScoreboardError};

/// Thread-safe scoreboard guarded by a reader/writer lock.
#[derive(Clone, Default)]
pub struct LockScoreboard {
    scores: Arc<RwLock<HashMap<String, Score>>>,
}

impl LockScoreboard {
    pub fn new() -> Self {
        LockScoreboard {
            scores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[cfg(test)]
    pub(crate) async fn hold_write_for_test(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<String, Score>> {
        self.scores.write().await
    }
}

#[async_trait]
impl Scoreboard for LockScoreboard {
    fn backend(&self) -> Backend {
        Backend::Lock
    }

    async fn update(&self, name: &str, value: Score) -> Result<(), ScoreboardError> {
        let mut scores = self.scores.write().await;
        scores.insert(name.to_string(), value);
        trace!("lock scoreboard: {} = {}", name, value);
        Ok(())
    }

    fn try_update(&self, name: &str, value: Score) -> Result<(), ScoreboardError> {
        let mut scores = self
            .scores
            .try_write()
            .map_err(|_| ScoreboardError::Busy)?;
        scores.insert(name.to_string(), value);
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Option<Score>, ScoreboardError> {
        let scores = self.scores.read().await;
        Ok(scores.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_latest_update_wins() {
        let board = LockScoreboard::new();
        board.update("a", 1).await.unwrap();
        board.update("a", 2).await.unwrap();
        assert_eq!(board.read("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let board = LockScoreboard::new();
        board.update("a", 1).await.unwrap();
        assert_eq!(board.read("b").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_concurrent_updates_all_land() {
        let board = LockScoreboard::new();
        let handles: Vec<_> = (0..100)
            .map(|i| {
                let board = board.clone();
                tokio::spawn(async move { board.update(&format!("key{}", i), i).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        for i in 0..100 {
            assert_eq!(board.read(&format!("key{}", i)).await.unwrap(), Some(i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_contention_keeps_a_submitted_value() {
        let board = LockScoreboard::new();
        let submitted: HashSet<Score> = (1..=50).map(|i| i * 1_000 + i).collect();
        let handles: Vec<_> = submitted
            .iter()
            .copied()
            .map(|v| {
                let board = board.clone();
                tokio::spawn(async move { board.update("hot", v).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let last = board.read("hot").await.unwrap().expect("hot key written");
        assert!(submitted.contains(&last), "unexpected value {}", last);
    }

    #[tokio::test]
    async fn test_try_update_busy_while_writer_holds_lock() {
        let board = LockScoreboard::new();
        {
            let _writer = board.hold_write_for_test().await;
            assert_eq!(board.try_update("a", 1), Err(ScoreboardError::Busy));
        }
        assert_eq!(board.try_update("a", 1), Ok(()));
        assert_eq!(board.read("a").await.unwrap(), Some(1));
    }

    /// Clones share one map.
    #[tokio::test]
    async fn test_clones_share_state() {
        let board = LockScoreboard::new();
        let other = board.clone();
        other.update("shared", 9).await.unwrap();
        assert_eq!(board.read("shared").await.unwrap(), Some(9));
    }
}
