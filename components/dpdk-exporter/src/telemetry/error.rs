// External crates
use std::path::PathBuf;
use std::time::Duration;

/// Every failure the telemetry client can surface.
///
/// None of these are recoverable inside the process: once the socket is in an
/// unknown framing state the only safe move is to stop and let the supervisor
/// restart the exporter, which re-runs the bounded connect retry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Dialing the socket failed on every allowed attempt.
    #[error("failed to connect to {} after {attempts} attempts", path.display())]
    ConnectExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The greeting frame sent on connect could not be read.
    #[error("failed to read greeting from {}: {reason}", path.display())]
    Handshake { path: PathBuf, reason: String },

    /// Writing a command to the socket failed.
    #[error("failed to send command {command:?}")]
    Send {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading a response chunk failed.
    #[error("failed to read response to {command:?}")]
    Receive {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// No chunk arrived within the configured read deadline.
    #[error("timed out after {timeout:?} waiting for response to {command:?}")]
    ReadTimeout { command: String, timeout: Duration },

    /// The peer closed the socket in the middle of a response.
    #[error("telemetry socket closed while waiting for response to {command:?}")]
    ConnectionClosed { command: String },

    /// The response grew past the configured limit without hitting a frame boundary.
    #[error("response to {command:?} exceeded {limit} bytes without a frame boundary")]
    ResponseTooLarge { command: String, limit: usize },

    /// The response body is not valid JSON for the expected shape.
    #[error("failed to decode response for {path}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response is valid JSON but not keyed by the requested path.
    #[error("response for {path} is missing its top-level key")]
    MissingKey { path: String },
}
