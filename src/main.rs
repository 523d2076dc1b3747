use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

mod config;
mod scoreboard;
mod workload;

use config::Config;
use workload::Summary;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    let channel_config = config.channel_config();
    let settings = config.workload_settings();
    info!(
        "Running {} workers / {} contenders (inbox capacity {}, read timeout {:?})",
        settings.workers, settings.contenders, channel_config.inbox_capacity, settings.read_timeout
    );

    let mut summary = Summary::default();

    for backend in config.backend.backends() {
        // Each run gets its own freshly built board; nothing is shared between runs.
        let (board, shutdown) = scoreboard::open(backend, &channel_config);
        info!("Scoreboard opened: {}", backend);

        let report = workload::run(board, &settings).await;
        if let Some(handle) = shutdown {
            handle.shutdown_and_wait().await;
        }
        summary.runs.push(report?);
    }

    if config.replay_len > 0 {
        let ops = workload::scripted_ops(config.replay_len, config.replay_keys, config.seed);
        summary.replay = Some(workload::differential(&channel_config, &ops).await?);
    }

    if config.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if !summary.is_clean() {
        warn!("Scoreboard guarantees violated, see warnings above");
        anyhow::bail!("workload reported mismatches");
    }

    info!("All scoreboard checks passed");
    Ok(())
}
