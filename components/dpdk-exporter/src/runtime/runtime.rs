// Local crates
use crate::{
    helpers::{load_config::Config, shutdown::Shutdown},
    metrics::{http::serve_metrics, metrics::ExporterMetrics},
    poller::poller::TelemetryPoller,
    telemetry::{connection::connect, transport::TelemetryClient},
};

// External crates
use anyhow::{Context, Result};
use prometheus::Registry;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::instrument;

/// How long finished-up tasks get to wind down after shutdown is triggered.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// DPDK exporter runtime: connect, poll in the background, serve `/metrics`.
///
/// Returns `Ok(())` on SIGINT/SIGTERM. A failing poll cycle is returned as the
/// error so the process exits non-zero and its supervisor restarts it.
#[instrument(
    name = "dpdk_exporter_runtime::run",
    target = "runtime::runtime",
    skip(config),
    level = "info"
)]
pub async fn run_exporter(config: Config, host_label: String) -> Result<()> {
    let shutdown = Shutdown::new();
    let telemetry = &config.telemetry;

    let registry = Registry::new();
    let metrics =
        ExporterMetrics::register(&registry).context("Failed to register exporter metrics")?;

    let client = tokio::select! {
        signal = shutdown.wait_for_signal() => {
            signal.context("Failed to listen for shutdown signals")?;
            tracing::info!("Shutdown requested before the telemetry socket was connected");
            return Ok(());
        }
        client = connect_client(&config) => client?,
    };

    let poller =
        TelemetryPoller::new(client, metrics, host_label).with_virtsvc(telemetry.include_virtsvc);
    let mut poller_task = tokio::spawn(poller.run(telemetry.poll_interval(), shutdown.child()));
    let mut server_task = tokio::spawn(serve_metrics(
        config.server.listen_addr,
        registry,
        shutdown.child(),
    ));

    let outcome = tokio::select! {
        signal = shutdown.wait_for_signal() => {
            signal.context("Failed to listen for shutdown signals")
        }
        joined = &mut poller_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("Telemetry poller stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("Telemetry poller task panicked")),
        },
        joined = &mut server_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("Metrics server stopped")),
            Err(e) => Err(anyhow::Error::new(e).context("Metrics server task panicked")),
        },
    };

    shutdown.trigger();
    wind_down("telemetry poller", poller_task).await;
    wind_down("metrics server", server_task).await;

    if let Err(e) = &outcome {
        tracing::error!(error = ?e, "DPDK exporter terminating");
    } else {
        tracing::info!("DPDK exporter stopped");
    }
    outcome
}

/// Connect once and print the raw answer to `command`.
#[instrument(
    name = "dpdk_exporter_runtime::query",
    target = "runtime::runtime",
    skip(config),
    level = "debug"
)]
pub async fn run_query(config: &Config, command: &str) -> Result<String> {
    let mut client = connect_client(config).await?;
    let raw = client
        .send(command)
        .await
        .with_context(|| format!("Telemetry command {command:?} failed"))?;

    Ok(match serde_json::from_slice::<serde_json::Value>(&raw) {
        Ok(value) => serde_json::to_string_pretty(&value)?,
        Err(_) => String::from_utf8_lossy(&raw).into_owned(),
    })
}

async fn connect_client(config: &Config) -> Result<TelemetryClient> {
    let telemetry = &config.telemetry;
    connect(
        &telemetry.socket_path,
        telemetry.max_connect_attempts,
        telemetry.connect_retry_delay(),
        telemetry.frame_limits(),
    )
    .await
    .context("Telemetry socket unavailable")
}

async fn wind_down<T>(name: &str, task: JoinHandle<T>) {
    if task.is_finished() {
        return;
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
        tracing::warn!(task = name, "Task did not stop within the shutdown grace period");
    }
}
