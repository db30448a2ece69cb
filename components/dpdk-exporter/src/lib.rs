//! DPDK telemetry exporter.
//!
//! Polls the DPDK / dp-service telemetry v2 socket and republishes interface
//! and graph statistics as Prometheus gauges:
//!
//! ```text
//! telemetry::connection -> telemetry::transport -> telemetry::decoder
//!                                   |
//!                          poller::poller -> metrics::metrics <- metrics::http (/metrics)
//! ```

pub mod cli;
pub mod helpers;
pub mod instrumentation;
pub mod metrics;
pub mod poller;
pub mod runtime;
pub mod telemetry;
