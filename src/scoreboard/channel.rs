//! Scoreboard whose map is owned by a single background task.
//!
//! Callers never touch the map. They submit closures to the owner's inbox and
//! the owner applies them one at a time, so operations are linearized in the
//! order the inbox accepts them.
//!
//! ```text
//!  update ──Box<FnOnce>──┐
//!  read   ──Box<FnOnce>──┼──▶ mpsc inbox ──▶ owner task: apply(&mut map)
//!    ▲                   │                        │
//!    └──── oneshot ◀─────┘◀───── read result ─────┘
//!                  shutdown signal (oneshot) ──▶ owner exits
//! ```
//!
//! Once the owner has exited its receiver is gone, so later submissions fail
//! with [`ScoreboardError::ShutDown`] instead of blocking. An `update` that
//! was accepted but not yet applied when shutdown fired is dropped.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{Backend, Score, Scoreboard, ScoreboardError};

/// Unit of work applied by the owning task.
type Submission = Box<dyn FnOnce(&mut HashMap<String, Score>) + Send>;

/// Settings for the channel-mediated backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Submissions the inbox buffers before `update` has to wait.
    /// 1 is the closest tokio gets to an unbuffered rendezvous.
    pub inbox_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig { inbox_capacity: 1 }
    }
}

/// Cloneable handle for submitting work to the owning task.
#[derive(Clone)]
pub struct ChannelScoreboard {
    inbox: mpsc::Sender<Submission>,
}

/// Stops the owning task.
///
/// Never call `update`/`read` concurrently with or after shutdown and rely on
/// the result: in-flight updates may be dropped and later calls fail with
/// [`ScoreboardError::ShutDown`].
///
/// Dropping the handle without calling either method leaves the owner running
/// until every [`ChannelScoreboard`] clone is dropped.
pub struct ShutdownHandle {
    signal: oneshot::Sender<()>,
    owner: JoinHandle<()>,
}

impl ChannelScoreboard {
    /// Spawn the owning task with an empty map.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &ChannelConfig) -> (Self, ShutdownHandle) {
        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (signal_tx, signal_rx) = oneshot::channel();

        let owner = tokio::spawn(serve(inbox_rx, signal_rx));

        (
            ChannelScoreboard { inbox: inbox_tx },
            ShutdownHandle {
                signal: signal_tx,
                owner,
            },
        )
    }

    async fn submit(&self, work: Submission) -> Result<(), ScoreboardError> {
        self.inbox
            .send(work)
            .await
            .map_err(|_| ScoreboardError::ShutDown)
    }
}

impl ShutdownHandle {
    /// Signal the owner to stop after its current operation.
    #[allow(dead_code)]
    pub fn shutdown(self) {
        let _ = self.signal.send(());
    }

    /// Signal the owner and wait for its task to finish.
    pub async fn shutdown_and_wait(self) {
        let ShutdownHandle { signal, owner } = self;
        let _ = signal.send(());
        if let Err(e) = owner.await {
            error!("Scoreboard owner task failed: {}", e);
        }
    }
}

/// Service loop of the owning task.
async fn serve(mut inbox: mpsc::Receiver<Submission>, mut shutdown: oneshot::Receiver<()>) {
    let mut scores: HashMap<String, Score> = HashMap::new();
    let mut serviced: u64 = 0;
    // Cleared when the shutdown handle is dropped unused, turning that branch off.
    let mut shutdown_armed = true;

    debug!("Scoreboard owner started");

    loop {
        tokio::select! {
            signal = &mut shutdown, if shutdown_armed => {
                match signal {
                    Ok(()) => {
                        info!("Scoreboard owner received shutdown signal");
                        break;
                    }
                    Err(_) => {
                        debug!("Shutdown handle dropped; serving until all handles are gone");
                        shutdown_armed = false;
                    }
                }
            }
            work = inbox.recv() => {
                match work {
                    Some(apply) => {
                        apply(&mut scores);
                        serviced += 1;
                    }
                    None => {
                        debug!("All scoreboard handles dropped");
                        break;
                    }
                }
            }
        }
    }

    info!(
        "Scoreboard owner stopped ({} operations serviced, {} keys)",
        serviced,
        scores.len()
    );
}

#[async_trait]
impl Scoreboard for ChannelScoreboard {
    fn backend(&self) -> Backend {
        Backend::Channel
    }

    async fn update(&self, name: &str, value: Score) -> Result<(), ScoreboardError> {
        let name = name.to_string();
        self.submit(Box::new(move |scores: &mut HashMap<String, Score>| {
            scores.insert(name, value);
        }))
        .await
    }

    fn try_update(&self, name: &str, value: Score) -> Result<(), ScoreboardError> {
        let name = name.to_string();
        let work: Submission = Box::new(move |scores: &mut HashMap<String, Score>| {
            scores.insert(name, value);
        });
        self.inbox.try_send(work).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ScoreboardError::Busy,
            mpsc::error::TrySendError::Closed(_) => ScoreboardError::ShutDown,
        })
    }

    async fn read(&self, name: &str) -> Result<Option<Score>, ScoreboardError> {
        let (done_tx, done_rx) = oneshot::channel();
        let name = name.to_string();
        self.submit(Box::new(move |scores: &mut HashMap<String, Score>| {
            let _ = done_tx.send(scores.get(&name).copied());
        }))
        .await?;
        // The sender is dropped unsent if the owner exits before applying us.
        done_rx.await.map_err(|_| ScoreboardError::ShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;

    const LIVENESS: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_latest_update_wins() {
        let (board, _shutdown) = ChannelScoreboard::new(&ChannelConfig::default());
        board.update("a", 1).await.unwrap();
        board.update("a", 2).await.unwrap();
        assert_eq!(board.read("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let (board, _shutdown) = ChannelScoreboard::new(&ChannelConfig::default());
        board.update("a", 1).await.unwrap();
        let found = board.read("b").await.unwrap();
        assert_eq!(found, None);
        assert_eq!(found.unwrap_or_default(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_concurrent_updates_all_land() {
        let (board, _shutdown) = ChannelScoreboard::new(&ChannelConfig::default());
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
        let (board, _shutdown) = ChannelScoreboard::new(&ChannelConfig { inbox_capacity: 8 });
        let submitted: HashSet<Score> = (1..=50).map(|i| -i * 7).collect();
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

    /// After shutdown the owner is gone. Calls must come back with `ShutDown`;
    /// the timeout turns a regression to "block forever" into a failure.
    #[tokio::test]
    async fn test_calls_after_shutdown_fail_instead_of_hanging() {
        let (board, shutdown) = ChannelScoreboard::new(&ChannelConfig::default());
        board.update("a", 1).await.unwrap();
        shutdown.shutdown_and_wait().await;

        let update = timeout(LIVENESS, board.update("a", 2))
            .await
            .expect("update after shutdown hung");
        assert_eq!(update, Err(ScoreboardError::ShutDown));

        let read = timeout(LIVENESS, board.read("a"))
            .await
            .expect("read after shutdown hung");
        assert_eq!(read, Err(ScoreboardError::ShutDown));

        assert_eq!(board.try_update("a", 3), Err(ScoreboardError::ShutDown));
    }

    /// Fire-and-forget shutdown: a read racing the owner's exit either gets
    /// serviced or reports `ShutDown`, but never hangs.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_read_racing_shutdown_never_hangs() {
        let (board, shutdown) = ChannelScoreboard::new(&ChannelConfig { inbox_capacity: 4 });
        board.update("a", 1).await.unwrap();
        shutdown.shutdown();

        let read = timeout(LIVENESS, board.read("a"))
            .await
            .expect("read racing shutdown hung");
        assert!(
            matches!(read, Ok(Some(1)) | Err(ScoreboardError::ShutDown)),
            "unexpected result {:?}",
            read
        );
    }

    #[tokio::test]
    async fn test_owner_exits_when_all_handles_dropped() {
        let (board, shutdown) = ChannelScoreboard::new(&ChannelConfig::default());
        let ShutdownHandle { signal, owner } = shutdown;
        drop(signal);
        board.update("a", 1).await.unwrap();
        assert_eq!(board.read("a").await.unwrap(), Some(1));
        drop(board);

        timeout(LIVENESS, owner)
            .await
            .expect("owner kept running with no handles")
            .unwrap();
    }

    /// Block the owner inside a submission, fill the one-slot inbox, and the
    /// next non-blocking update is rejected.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_try_update_busy_when_inbox_full() {
        let (board, _shutdown) = ChannelScoreboard::new(&ChannelConfig { inbox_capacity: 1 });
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        board
            .submit(Box::new(move |_: &mut HashMap<String, Score>| {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            }))
            .await
            .unwrap();
        entered_rx.await.unwrap();

        assert_eq!(board.try_update("a", 1), Ok(()));
        assert_eq!(board.try_update("b", 2), Err(ScoreboardError::Busy));

        release_tx.send(()).unwrap();
        assert_eq!(board.read("a").await.unwrap(), Some(1));
        assert_eq!(board.read("b").await.unwrap(), None);
    }
}
