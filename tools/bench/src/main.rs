mod config;
mod scenario;

use crate::config::build_configs;
use crate::scenario::{Scenario, run};
use clap::{Parser, Subcommand};
use rill_observability::{GENERAL_METRICS, PrometheusExporterConfig};
use rill_source::CancellationToken;
use rill_tracing::{LogFormat, Tracer};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

#[derive(Parser)]
#[command(version, about = "Runs rill reduction scenarios end to end", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Overrides `BENCH_ITEMS`.
    #[arg(long, global = true)]
    items: Option<u64>,

    /// Overrides `BENCH_FAN_OUT`.
    #[arg(long, global = true)]
    fan_out: Option<usize>,

    /// Overrides `LOG_FORMAT`: `json`, `logfmt` or `terminal`.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Zips two finite sources.
    Zip,
    /// Merges `fan_out` finite sources in arrival order.
    Choose,
    /// Concatenates `fan_out` finite sources.
    Combine,
    /// Broadcasts one upstream to `fan_out` subscribers.
    Broadcast,
    /// Takes `items` from an infinite source.
    Take,
}

impl From<Command> for Scenario {
    fn from(command: Command) -> Self {
        match command {
            Command::Zip => Scenario::Zip,
            Command::Choose => Scenario::Choose,
            Command::Combine => Scenario::Combine,
            Command::Broadcast => Scenario::Broadcast,
            Command::Take => Scenario::Take,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = build_configs();
    if let Some(items) = cli.items {
        config.bench_config.items = items;
    }
    if let Some(fan_out) = cli.fan_out {
        config.bench_config.fan_out = fan_out;
    }
    if let Some(format) = cli.log_format {
        config.log_config.format = format;
    }

    Tracer::from_config(&config.log_config).init();
    tracing::info!(?config, "Loaded config");

    let started_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    GENERAL_METRICS.process_started_at[&env!("CARGO_PKG_VERSION")].set(started_at as i64);

    let (stop_sender, stop_receiver) = watch::channel(false);
    let exporter = config
        .bench_config
        .prometheus_port
        .map(|port| tokio::spawn(PrometheusExporterConfig::pull(port).run(stop_receiver)));

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received SIGINT, cancelling the scenario");
                token.cancel();
            }
        }
    });

    let result = run(cli.command.into(), &config.bench_config, &token).await;
    stop_sender.send_replace(true);
    if let Some(exporter) = exporter {
        exporter.await??;
    }

    let report = result?;
    if !report.is_complete() && !token.is_cancelled() {
        anyhow::bail!(
            "{} delivered {} of {} items",
            report.scenario.label(),
            report.delivered,
            report.expected
        );
    }
    tracing::info!(elapsed = ?report.elapsed, "Done");
    Ok(())
}
