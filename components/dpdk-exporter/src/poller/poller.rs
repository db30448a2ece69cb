//! Telemetry Poller
//!
//! Drives one fixed command sequence per cycle over the exclusively owned
//! [`TelemetryClient`] and writes every value into [`ExporterMetrics`]:
//!
//! ```text
//! /ethdev/list
//!   └─ per id, in list order: /ethdev/info,<id> -> /ethdev/xstats,<id>
//! /dp_service/nat/used_port_count
//! /dp_service/virtsvc/used_port_count   (optional)
//! /dp_service/graph/call_count
//! ```
//!
//! Failure semantics:
//! - Any error ends the cycle and the poll loop; recovery is a process restart.
//! - Updates already applied earlier in a failing cycle stay visible, there is
//!   no rollback.

// Local crates
use crate::metrics::metrics::{
    ExporterMetrics, NAT_USED_PORT_COUNT_STAT, VIRTSVC_USED_PORT_COUNT_STAT,
};
use crate::telemetry::{error::TelemetryError, transport::TelemetryClient};

// External crates
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// What the poll loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Waiting for the next tick.
    Idle,
    /// Executing the command sequence.
    Polling,
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollSummary {
    pub interfaces: usize,
    pub series_updated: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct TelemetryPoller {
    client: TelemetryClient,
    metrics: ExporterMetrics,
    host_label: String,
    include_virtsvc: bool,
    state: PollerState,
}

impl TelemetryPoller {
    pub fn new(client: TelemetryClient, metrics: ExporterMetrics, host_label: String) -> Self {
        Self {
            client,
            metrics,
            host_label,
            include_virtsvc: true,
            state: PollerState::Idle,
        }
    }

    /// Toggle the `/dp_service/virtsvc/used_port_count` step.
    pub fn with_virtsvc(mut self, include: bool) -> Self {
        self.include_virtsvc = include;
        self
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Poll every `interval` until `cancel` fires or a cycle fails.
    ///
    /// The first cycle starts immediately; the interval is measured from the
    /// end of one cycle to the start of the next.
    #[instrument(
        name = "dpdk_exporter_poller::run",
        target = "poller::poller",
        skip(self, cancel),
        level = "debug"
    )]
    pub async fn run(
        mut self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), TelemetryError> {
        tracing::info!(
            host_label = %self.host_label,
            include_virtsvc = self.include_virtsvc,
            interval_secs = interval.as_secs(),
            "Starting telemetry poller"
        );

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Telemetry poller cancelled during a cycle");
                    return Ok(());
                }
                result = self.poll_once() => result,
            };

            match result {
                Ok(summary) => tracing::info!(
                    interfaces = summary.interfaces,
                    series_updated = summary.series_updated,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "Telemetry poll cycle completed"
                ),
                Err(e) => {
                    tracing::error!(error = %e, "Telemetry poll cycle failed, stopping poller");
                    return Err(e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Telemetry poller cancelled while idle");
                    return Ok(());
                }
                _ = sleep(interval) => {}
            }
        }
    }

    /// Run the full command sequence once and upsert every value.
    #[instrument(
        name = "dpdk_exporter_poller::poll_once",
        target = "poller::poller",
        skip(self),
        level = "debug"
    )]
    pub async fn poll_once(&mut self) -> Result<PollSummary, TelemetryError> {
        self.state = PollerState::Polling;
        let started = Instant::now();

        let result = self.poll_sequence().await;
        let elapsed = started.elapsed();

        self.metrics.observe_poll(elapsed, result.is_ok());
        self.state = PollerState::Idle;

        result.map(|mut summary| {
            summary.elapsed = elapsed;
            summary
        })
    }

    async fn poll_sequence(&mut self) -> Result<PollSummary, TelemetryError> {
        let mut summary = PollSummary::default();

        let port_ids = self.client.ethdev_list().await?;
        summary.interfaces = port_ids.len();
        tracing::debug!(port_ids = ?port_ids, "Polling DPDK interfaces");

        for id in port_ids {
            let name = self.client.ethdev_info(id).await?.name;
            let stats = self.client.ethdev_xstats(id).await?;

            tracing::trace!(port_id = id, interface = %name, stats = stats.len(), "Updating xstats");
            for (stat_name, value) in &stats {
                self.metrics.set_interface_stat(&name, stat_name, *value);
            }
            summary.series_updated += stats.len();
        }

        let nat_usage = self.client.nat_used_port_count().await?;
        for (interface, count) in &nat_usage {
            self.metrics
                .set_interface_stat(interface, NAT_USED_PORT_COUNT_STAT, *count as f64);
        }
        summary.series_updated += nat_usage.len();

        if self.include_virtsvc {
            let virtsvc_usage = self.client.virtsvc_used_port_count().await?;
            for (interface, count) in &virtsvc_usage {
                self.metrics
                    .set_interface_stat(interface, VIRTSVC_USED_PORT_COUNT_STAT, *count as f64);
            }
            summary.series_updated += virtsvc_usage.len();
        }

        let call_count = self.client.graph_call_count().await?;
        for (graph_node, count) in &call_count.nodes {
            self.metrics
                .set_graph_stat(&self.host_label, graph_node, *count);
        }
        summary.series_updated += call_count.nodes.len();

        Ok(summary)
    }
}
