use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::scoreboard::{Backend, ChannelConfig};
use crate::workload::WorkloadSettings;

/// Which backends a run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    Channel,
    Lock,
    Both,
}

impl BackendChoice {
    pub fn backends(self) -> Vec<Backend> {
        match self {
            BackendChoice::Channel => vec![Backend::Channel],
            BackendChoice::Lock => vec![Backend::Lock],
            BackendChoice::Both => Backend::ALL.to_vec(),
        }
    }
}

/// Concurrent scoreboard workload runner
#[derive(Parser, Debug, Clone)]
#[command(name = "scoreboard", version, about)]
pub struct Config {
    /// Scoreboard backend(s) to exercise
    #[arg(long, env = "SCOREBOARD_BACKEND", value_enum, default_value = "both")]
    pub backend: BackendChoice,

    /// Concurrent tasks in the fan-out and burst stages
    #[arg(long, env = "WORKERS", default_value = "100")]
    pub workers: usize,

    /// Concurrent tasks racing on the contended key
    #[arg(long, env = "CONTENDERS", default_value = "32")]
    pub contenders: usize,

    /// Inbox capacity of the channel backend (1 ≈ unbuffered)
    #[arg(long, env = "INBOX_CAPACITY", default_value = "1")]
    pub inbox_capacity: usize,

    /// Upper bound on each verification read, in milliseconds
    #[arg(long, env = "READ_TIMEOUT_MS", default_value = "2000")]
    pub read_timeout_ms: u64,

    /// Operations in the differential replay script (0 disables it)
    #[arg(long, env = "REPLAY_LEN", default_value = "200")]
    pub replay_len: usize,

    /// Distinct names the replay script draws from
    #[arg(long, env = "REPLAY_KEYS", default_value = "8")]
    pub replay_keys: usize,

    /// Seed for the replay script
    #[arg(long, env = "SEED", default_value = "1")]
    pub seed: u64,

    /// Print the run summary as JSON on stdout
    #[arg(long, env = "JSON_REPORT", default_value = "false")]
    pub json: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.contenders == 0 {
            anyhow::bail!("contenders must be at least 1");
        }
        if self.inbox_capacity == 0 {
            anyhow::bail!("inbox_capacity must be at least 1");
        }
        if self.read_timeout_ms == 0 {
            anyhow::bail!("read_timeout_ms must be positive");
        }
        if self.replay_len > 0 && self.replay_keys == 0 {
            anyhow::bail!("replay_keys must be at least 1 when replay is enabled");
        }
        Ok(())
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            inbox_capacity: self.inbox_capacity,
        }
    }

    pub fn workload_settings(&self) -> WorkloadSettings {
        WorkloadSettings {
            workers: self.workers,
            contenders: self.contenders,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}
