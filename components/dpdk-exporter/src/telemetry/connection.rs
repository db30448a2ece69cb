// Local crates
use crate::telemetry::{
    error::TelemetryError,
    transport::{FrameLimits, RecvFailure, TelemetryClient},
};

// External crates
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tokio_seqpacket::UnixSeqpacket;
use tracing::instrument;

/// Default telemetry v2 socket of a DPDK primary process.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/dpdk/rte/dpdk_telemetry.v2";
pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Unsolicited frame the service writes as soon as a client connects.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerGreeting {
    pub version: Option<String>,
    pub pid: Option<u32>,
    pub max_output_len: Option<usize>,
}

/// Dial the telemetry socket and consume its greeting.
///
/// Retry policy:
/// - Up to `max_attempts` dials in total, sleeping a fixed `retry_delay`
///   between two attempts and never after the last one.
/// - Exhausting every attempt returns [`TelemetryError::ConnectExhausted`].
///
/// Exactly one read follows a successful dial to drop the greeting frame; if it
/// fails the framing state is unknown and [`TelemetryError::Handshake`] is
/// returned without retrying.
#[instrument(
    name = "dpdk_exporter_connection::connect",
    target = "telemetry::connection",
    skip(path, limits),
    fields(socket_path = %path.display()),
    level = "debug"
)]
pub async fn connect(
    path: &Path,
    max_attempts: u32,
    retry_delay: Duration,
    limits: FrameLimits,
) -> Result<TelemetryClient, TelemetryError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    let socket = loop {
        attempt += 1;
        match UnixSeqpacket::connect(path).await {
            Ok(socket) => break socket,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    "Failed to connect to telemetry socket"
                );
                if attempt >= max_attempts {
                    tracing::error!(
                        attempts = attempt,
                        "Exhausted connection attempts to telemetry socket"
                    );
                    return Err(TelemetryError::ConnectExhausted {
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source: e,
                    });
                }
                sleep(retry_delay).await;
            }
        }
    };

    tracing::info!(attempt, "Connected to telemetry socket");

    let mut client = TelemetryClient::new(socket, path.to_path_buf(), limits);
    flush_greeting(&mut client).await?;
    Ok(client)
}

/// Read and discard the greeting, adopting its advertised output limit.
async fn flush_greeting(client: &mut TelemetryClient) -> Result<(), TelemetryError> {
    let endpoint = client.endpoint().to_path_buf();
    let handshake_error = |reason: String| TelemetryError::Handshake {
        path: endpoint.clone(),
        reason,
    };

    let n = match client.recv_chunk().await {
        Ok(n) => n,
        Err(RecvFailure::TimedOut(timeout)) => {
            return Err(handshake_error(format!("no greeting within {timeout:?}")));
        }
        Err(RecvFailure::Closed) => {
            return Err(handshake_error("socket closed before greeting".to_owned()));
        }
        Err(RecvFailure::Io(e)) => return Err(handshake_error(e.to_string())),
    };

    match serde_json::from_slice::<ServerGreeting>(client.chunk(n)) {
        Ok(greeting) => {
            tracing::info!(
                server_version = greeting.version.as_deref().unwrap_or("unknown"),
                server_pid = greeting.pid,
                max_output_len = greeting.max_output_len,
                "Received telemetry greeting"
            );
            if let Some(max_output_len) = greeting.max_output_len {
                client.ensure_read_buffer(max_output_len);
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, greeting_len = n, "Discarding unparseable telemetry greeting");
        }
    }

    Ok(())
}
