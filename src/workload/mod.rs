//! Concurrent workload driver that exercises a scoreboard and checks its
//! guarantees at runtime.
//!
//! Stages:
//! - **fan-out**: one task per key, each writes its own key; afterwards every
//!   key must read back exactly what was written (no lost updates).
//! - **contention**: many tasks write the same key; the survivor must be one
//!   of the submitted values.
//! - **burst**: non-blocking writes; every accepted write must be visible and
//!   every rejected one absent.
//!
//! A scripted replay against fresh instances of both backends checks that
//! they agree on every read.

pub mod script;

pub use script::{replay, scripted_ops, Op};

use anyhow::Result;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::scoreboard::{
    self, read_with_timeout, Backend, ChannelConfig, Score, Scoreboard, ScoreboardError,
};

/// Knobs for a workload run.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadSettings {
    /// Tasks in the fan-out and burst stages.
    pub workers: usize,
    /// Tasks racing on the contended key.
    pub contenders: usize,
    /// Upper bound on each verification read.
    pub read_timeout: Duration,
}

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub tasks: usize,
    /// Writes the backend took.
    pub accepted: usize,
    /// Non-blocking writes turned away as busy.
    pub rejected: usize,
    /// Reads that disagreed with what the stage wrote.
    pub mismatches: usize,
    pub elapsed_ms: f64,
}

/// All stages run against one backend.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub backend: Backend,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn mismatches(&self) -> usize {
        self.stages.iter().map(|s| s.mismatches).sum()
    }
}

/// Differential replay of one script against both backends.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub operations: usize,
    pub reads: usize,
    /// Reads that found a value (identical on both backends when they agree).
    pub found: usize,
    pub disagreements: usize,
}

impl ReplayReport {
    pub fn agrees(&self) -> bool {
        self.disagreements == 0
    }
}

/// Everything a binary run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub runs: Vec<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayReport>,
}

impl Summary {
    pub fn is_clean(&self) -> bool {
        self.runs.iter().all(|r| r.mismatches() == 0)
            && self.replay.as_ref().map_or(true, ReplayReport::agrees)
    }
}

fn fan_out_key(i: usize) -> String {
    format!("key{}", i)
}

fn burst_key(i: usize) -> String {
    format!("burst{}", i)
}

const CONTENDED_KEY: &str = "contended";

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

/// `workers` tasks each write their own key, then every key is read back.
pub async fn fan_out(
    board: &Arc<dyn Scoreboard>,
    workers: usize,
    read_timeout: Duration,
) -> Result<StageReport> {
    let started = Instant::now();

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let board = Arc::clone(board);
            tokio::spawn(async move { board.update(&fan_out_key(i), i as Score).await })
        })
        .collect();
    for joined in join_all(handles).await {
        joined??;
    }

    let mut mismatches = 0;
    for i in 0..workers {
        let key = fan_out_key(i);
        match read_with_timeout(&**board, &key, read_timeout).await? {
            Some(v) if v == i as Score => {}
            other => {
                warn!("fan-out: {} read back {:?}, expected {}", key, other, i);
                mismatches += 1;
            }
        }
    }

    Ok(StageReport {
        stage: "fan-out",
        tasks: workers,
        accepted: workers,
        rejected: 0,
        mismatches,
        elapsed_ms: elapsed_ms(started),
    })
}

/// `contenders` tasks race distinct values onto one key.
pub async fn contend(
    board: &Arc<dyn Scoreboard>,
    contenders: usize,
    read_timeout: Duration,
) -> Result<StageReport> {
    let started = Instant::now();
    let submitted: HashSet<Score> = (0..contenders).map(|i| (i as Score + 1) * 31).collect();

    let handles: Vec<_> = submitted
        .iter()
        .copied()
        .map(|value| {
            let board = Arc::clone(board);
            tokio::spawn(async move { board.update(CONTENDED_KEY, value).await })
        })
        .collect();
    for joined in join_all(handles).await {
        joined??;
    }

    let survivor = read_with_timeout(&**board, CONTENDED_KEY, read_timeout).await?;
    let mismatches = match survivor {
        Some(v) if submitted.contains(&v) => 0,
        other => {
            warn!(
                "contention: {} holds {:?}, which no task submitted",
                CONTENDED_KEY, other
            );
            1
        }
    };

    Ok(StageReport {
        stage: "contention",
        tasks: contenders,
        accepted: contenders,
        rejected: 0,
        mismatches,
        elapsed_ms: elapsed_ms(started),
    })
}

/// `workers` tasks each try a non-blocking write to their own key.
pub async fn burst(
    board: &Arc<dyn Scoreboard>,
    workers: usize,
    read_timeout: Duration,
) -> Result<StageReport> {
    let started = Instant::now();

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let board = Arc::clone(board);
            tokio::spawn(async move { (i, board.try_update(&burst_key(i), i as Score)) })
        })
        .collect();

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for joined in join_all(handles).await {
        match joined? {
            (i, Ok(())) => accepted.push(i),
            (i, Err(ScoreboardError::Busy)) => rejected.push(i),
            (_, Err(e)) => return Err(e.into()),
        }
    }

    let mut mismatches = 0;
    for &i in &accepted {
        let key = burst_key(i);
        let got = read_with_timeout(&**board, &key, read_timeout).await?;
        if got != Some(i as Score) {
            warn!("burst: accepted {} read back {:?}", key, got);
            mismatches += 1;
        }
    }
    for &i in &rejected {
        let key = burst_key(i);
        let got = read_with_timeout(&**board, &key, read_timeout).await?;
        if got.is_some() {
            warn!("burst: rejected {} was applied anyway ({:?})", key, got);
            mismatches += 1;
        }
    }

    Ok(StageReport {
        stage: "burst",
        tasks: workers,
        accepted: accepted.len(),
        rejected: rejected.len(),
        mismatches,
        elapsed_ms: elapsed_ms(started),
    })
}

/// Run every stage against `board`.
pub async fn run(board: Arc<dyn Scoreboard>, settings: &WorkloadSettings) -> Result<RunReport> {
    let backend = board.backend();
    let stages = vec![
        fan_out(&board, settings.workers, settings.read_timeout).await?,
        contend(&board, settings.contenders, settings.read_timeout).await?,
        burst(&board, settings.workers, settings.read_timeout).await?,
    ];

    for stage in &stages {
        info!(
            "[{}] {}: {} tasks, {} accepted, {} rejected, {} mismatches in {:.2}ms",
            backend,
            stage.stage,
            stage.tasks,
            stage.accepted,
            stage.rejected,
            stage.mismatches,
            stage.elapsed_ms
        );
    }

    Ok(RunReport { backend, stages })
}

/// Replay `ops` against fresh instances of every backend and compare reads.
pub async fn differential(config: &ChannelConfig, ops: &[Op]) -> Result<ReplayReport> {
    let mut results: Vec<(Backend, Vec<Option<Score>>)> = Vec::new();
    for backend in Backend::ALL {
        let (board, shutdown) = scoreboard::open(backend, config);
        let reads = replay(&*board, ops).await?;
        if let Some(handle) = shutdown {
            handle.shutdown_and_wait().await;
        }
        results.push((backend, reads));
    }

    let (_, baseline) = &results[0];
    let mut disagreements = 0;
    for (backend, reads) in &results[1..] {
        let differing = baseline
            .iter()
            .zip(reads)
            .filter(|(a, b)| a != b)
            .count()
            + baseline.len().abs_diff(reads.len());
        if differing > 0 {
            warn!(
                "replay: {} disagrees with {} on {} reads",
                backend, results[0].0, differing
            );
        }
        disagreements += differing;
    }

    let report = ReplayReport {
        operations: ops.len(),
        reads: baseline.len(),
        found: baseline.iter().filter(|r| r.is_some()).count(),
        disagreements,
    };
    info!(
        "Replay: {} ops, {} reads ({} found), {} disagreements",
        report.operations, report.reads, report.found, report.disagreements
    );
    Ok(report)
}
