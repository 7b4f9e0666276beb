//! Prometheus-related functionality, such as [`PrometheusExporterConfig`].

use std::net::Ipv4Addr;

use anyhow::Context as _;
use tokio::sync::watch;
use vise::MetricsCollection;
use vise_exporter::MetricsExporter;

/// Configuration of a pull-based Prometheus exporter.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusExporterConfig {
    port: u16,
}

impl PrometheusExporterConfig {
    /// Exporter serving `/metrics` on `port` of every interface.
    pub const fn pull(port: u16) -> Self {
        Self { port }
    }

    /// Runs the exporter until `stop_receiver` flips. Should be spawned in a separate Tokio task.
    pub async fn run(self, mut stop_receiver: watch::Receiver<bool>) -> anyhow::Result<()> {
        let registry = MetricsCollection::lazy().collect();
        let metrics_exporter =
            MetricsExporter::new(registry.into()).with_graceful_shutdown(async move {
                stop_receiver.changed().await.ok();
            });

        let bind_address = (Ipv4Addr::UNSPECIFIED, self.port).into();
        let metrics_server = metrics_exporter
            .bind(bind_address)
            .await
            .context("Failed starting metrics server")?;
        tracing::info!(address = %metrics_server.local_addr(), "started Prometheus exporter");
        metrics_server.start().await?;

        Ok(())
    }
}
