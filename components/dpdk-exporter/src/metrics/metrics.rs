// External crates
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::time::Duration;
use tracing::instrument;

/// Label value of `stat_name` for NAT used-port counts.
pub const NAT_USED_PORT_COUNT_STAT: &str = "nat_used_port_count";
/// Label value of `stat_name` for virtual-service used-port counts.
pub const VIRTSVC_USED_PORT_COUNT_STAT: &str = "virtsvc_used_port_count";

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to create metric {name}")]
    Create {
        name: &'static str,
        #[source]
        source: prometheus::Error,
    },
    #[error("failed to register metric {name}")]
    Register {
        name: &'static str,
        #[source]
        source: prometheus::Error,
    },
}

/// Gauge families the exporter republishes, plus its own poll metrics.
///
/// Everything lives on the [`Registry`] passed to [`ExporterMetrics::register`];
/// there is no global state, so each test can build an isolated registry. Gauge
/// writes are atomic per label combination, so a scrape never sees a torn
/// value while the poller is writing.
#[derive(Debug, Clone)]
pub struct ExporterMetrics {
    interface_stat: GaugeVec,
    graph_stat: GaugeVec,
    poll_duration_seconds: Histogram,
    polls_total: IntCounterVec,
}

impl ExporterMetrics {
    #[instrument(
        name = "dpdk_exporter_metrics::register",
        target = "metrics::metrics",
        skip_all,
        level = "debug"
    )]
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let interface_stat = GaugeVec::new(
            Opts::new("dpdk_interface_stat", "DPDK interface statistic"),
            &["interface", "stat_name"],
        )
        .map_err(|source| MetricsError::Create {
            name: "dpdk_interface_stat",
            source,
        })?;

        let graph_stat = GaugeVec::new(
            Opts::new("dpdk_graph_stat", "Dp-Service graph statistics"),
            &["node_name", "graph_node"],
        )
        .map_err(|source| MetricsError::Create {
            name: "dpdk_graph_stat",
            source,
        })?;

        let poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "dpdk_exporter_poll_duration_seconds",
                "Histogram of telemetry poll cycle durations (seconds)",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .map_err(|source| MetricsError::Create {
            name: "dpdk_exporter_poll_duration_seconds",
            source,
        })?;

        let polls_total = IntCounterVec::new(
            Opts::new(
                "dpdk_exporter_polls_total",
                "Number of telemetry poll cycles by outcome",
            ),
            &["outcome"],
        )
        .map_err(|source| MetricsError::Create {
            name: "dpdk_exporter_polls_total",
            source,
        })?;

        registry
            .register(Box::new(interface_stat.clone()))
            .map_err(|source| MetricsError::Register {
                name: "dpdk_interface_stat",
                source,
            })?;
        registry
            .register(Box::new(graph_stat.clone()))
            .map_err(|source| MetricsError::Register {
                name: "dpdk_graph_stat",
                source,
            })?;
        registry
            .register(Box::new(poll_duration_seconds.clone()))
            .map_err(|source| MetricsError::Register {
                name: "dpdk_exporter_poll_duration_seconds",
                source,
            })?;
        registry
            .register(Box::new(polls_total.clone()))
            .map_err(|source| MetricsError::Register {
                name: "dpdk_exporter_polls_total",
                source,
            })?;

        tracing::debug!("Registered DPDK exporter metric families");
        Ok(Self {
            interface_stat,
            graph_stat,
            poll_duration_seconds,
            polls_total,
        })
    }

    /// Upsert `dpdk_interface_stat{interface, stat_name}`.
    pub fn set_interface_stat(&self, interface: &str, stat_name: &str, value: f64) {
        self.interface_stat
            .with_label_values(&[interface, stat_name])
            .set(value);
    }

    /// Upsert `dpdk_graph_stat{node_name, graph_node}`.
    pub fn set_graph_stat(&self, node_name: &str, graph_node: &str, value: f64) {
        self.graph_stat
            .with_label_values(&[node_name, graph_node])
            .set(value);
    }

    /// Record the outcome and duration of one poll cycle.
    pub fn observe_poll(&self, elapsed: Duration, success: bool) {
        self.poll_duration_seconds.observe(elapsed.as_secs_f64());
        let outcome = if success { "success" } else { "failure" };
        self.polls_total.with_label_values(&[outcome]).inc();
    }
}
