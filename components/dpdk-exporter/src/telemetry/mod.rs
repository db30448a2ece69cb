//! Client side of the DPDK telemetry v2 socket protocol.
//!
//! ```text
//! connection::connect -> TelemetryClient::send -> decoder::decode -> TelemetryResponse
//! ```

pub mod commands;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod transport;
