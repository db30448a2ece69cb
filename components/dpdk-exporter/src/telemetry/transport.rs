//! Request/response framing over the telemetry socket.
//!
//! The telemetry service has no length header and no terminator. A response is
//! considered complete once the accumulated bytes contain the path of the
//! command that was sent, because the service always keys its JSON answer by
//! that path. This is a wire-compatibility contract with the service and the
//! match target must stay the command's path prefix.

// Local crates
use crate::telemetry::{
    commands::{Command, PortId, path_prefix},
    decoder::{
        EthdevInfo, GraphCallCount, TelemetryResponse, decode, decode_collection, decode_payload,
    },
    error::TelemetryError,
};

// External crates
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_seqpacket::UnixSeqpacket;
use tracing::instrument;

/// Default size of a single receive, comfortably above a typical answer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Default cap on a single accumulated response.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

/// Bounds applied to every response read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Size of the buffer handed to each `recv`.
    pub read_buffer_size: usize,
    /// Upper bound on the accumulated response.
    pub max_response_size: usize,
    /// Deadline for each individual read, `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            read_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Returns true once the accumulated response contains `prefix`.
///
/// Only the bytes from `previous_len` onwards are new. The scan starts
/// `prefix.len() - 1` bytes before them so a path split across two reads is
/// still found, without rescanning what earlier iterations already checked.
pub fn frame_boundary_reached(accumulated: &[u8], previous_len: usize, prefix: &[u8]) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let start = previous_len.saturating_sub(prefix.len() - 1);
    accumulated[start..]
        .windows(prefix.len())
        .any(|window| window == prefix)
}

/// Live connection to the telemetry socket.
///
/// Strictly request/response: every method takes `&mut self`, so a second
/// command can never be issued while a response is still being framed.
pub struct TelemetryClient {
    socket: UnixSeqpacket,
    endpoint: PathBuf,
    read_buffer: Vec<u8>,
    limits: FrameLimits,
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("endpoint", &self.endpoint)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl TelemetryClient {
    pub(crate) fn new(socket: UnixSeqpacket, endpoint: PathBuf, limits: FrameLimits) -> Self {
        Self {
            socket,
            endpoint,
            read_buffer: vec![0u8; limits.read_buffer_size],
            limits,
        }
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Grow the receive buffer so one message of `size` bytes fits in a single read.
    ///
    /// A seqpacket receive into a shorter buffer silently drops the rest of the
    /// message, so this has to follow the server's advertised output limit.
    /// The size never exceeds `max_response_size`.
    pub(crate) fn ensure_read_buffer(&mut self, requested: usize) {
        let size = requested.min(self.limits.max_response_size);
        if size < requested {
            tracing::warn!(
                requested,
                max_response_size = self.limits.max_response_size,
                "Server output limit exceeds the response size cap, clamping read buffer"
            );
        }
        if size > self.read_buffer.len() {
            tracing::debug!(
                previous_size = self.read_buffer.len(),
                new_size = size,
                "Growing telemetry read buffer to the server's output limit"
            );
            self.read_buffer.resize(size, 0);
            self.limits.read_buffer_size = size;
        }
    }

    /// Receive one message into the read buffer, honouring the read deadline.
    pub(crate) async fn recv_chunk(&mut self) -> Result<usize, RecvFailure> {
        let recv = self.socket.recv(&mut self.read_buffer);
        let result = match self.limits.read_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, recv).await {
                Ok(result) => result,
                Err(_) => return Err(RecvFailure::TimedOut(timeout)),
            },
            None => recv.await,
        };
        match result {
            Ok(0) => Err(RecvFailure::Closed),
            Ok(n) => Ok(n),
            Err(e) => Err(RecvFailure::Io(e)),
        }
    }

    pub(crate) fn chunk(&self, n: usize) -> &[u8] {
        &self.read_buffer[..n]
    }

    /// Send `command` and return the framed raw response.
    #[instrument(
        name = "dpdk_exporter_transport::send",
        target = "telemetry::transport",
        skip(self),
        level = "debug"
    )]
    pub async fn send(&mut self, command: &str) -> Result<Bytes, TelemetryError> {
        let written = self
            .socket
            .send(command.as_bytes())
            .await
            .map_err(|source| TelemetryError::Send {
                command: command.to_owned(),
                source,
            })?;
        if written != command.len() {
            return Err(TelemetryError::Send {
                command: command.to_owned(),
                source: std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("wrote {written} of {} bytes", command.len()),
                ),
            });
        }

        let prefix = path_prefix(command).as_bytes();
        let mut response = BytesMut::new();
        let mut reads = 0usize;

        loop {
            let n = self.recv_chunk().await.map_err(|failure| failure.into_error(command))?;
            reads += 1;

            let previous_len = response.len();
            if previous_len + n > self.limits.max_response_size {
                tracing::error!(
                    command = %command,
                    accumulated = previous_len + n,
                    limit = self.limits.max_response_size,
                    "Telemetry response exceeded size limit before its frame boundary"
                );
                return Err(TelemetryError::ResponseTooLarge {
                    command: command.to_owned(),
                    limit: self.limits.max_response_size,
                });
            }
            response.extend_from_slice(self.chunk(n));

            if frame_boundary_reached(&response, previous_len, prefix) {
                break;
            }
            tracing::trace!(
                command = %command,
                chunk_len = n,
                accumulated = response.len(),
                "Frame boundary not reached, reading next chunk"
            );
        }

        tracing::debug!(
            command = %command,
            reads,
            response_len = response.len(),
            "Telemetry response framed"
        );
        Ok(response.freeze())
    }

    /// Send a known command and decode its answer into the matching shape.
    pub async fn query(&mut self, command: Command) -> Result<TelemetryResponse, TelemetryError> {
        let raw = self.send(&command.to_string()).await?;
        decode(&raw, command.kind())
    }

    pub async fn ethdev_list(&mut self) -> Result<Vec<PortId>, TelemetryError> {
        self.fetch_collection(Command::EthdevList).await
    }

    pub async fn ethdev_info(&mut self, id: PortId) -> Result<EthdevInfo, TelemetryError> {
        let command = Command::EthdevInfo(id);
        let raw = self.send(&command.to_string()).await?;
        decode_payload(&raw, command.path())
    }

    pub async fn ethdev_xstats(
        &mut self,
        id: PortId,
    ) -> Result<BTreeMap<String, f64>, TelemetryError> {
        self.fetch_collection(Command::EthdevXstats(id)).await
    }

    pub async fn nat_used_port_count(&mut self) -> Result<BTreeMap<String, u64>, TelemetryError> {
        self.fetch_collection(Command::NatUsedPortCount).await
    }

    pub async fn virtsvc_used_port_count(
        &mut self,
    ) -> Result<BTreeMap<String, u64>, TelemetryError> {
        self.fetch_collection(Command::VirtsvcUsedPortCount).await
    }

    pub async fn graph_call_count(&mut self) -> Result<GraphCallCount, TelemetryError> {
        self.fetch_collection(Command::GraphCallCount).await
    }

    async fn fetch_collection<T>(&mut self, command: Command) -> Result<T, TelemetryError>
    where
        T: DeserializeOwned + Default,
    {
        let raw = self.send(&command.to_string()).await?;
        decode_collection(&raw, command.path())
    }
}

/// Why a single receive did not yield bytes.
#[derive(Debug)]
pub(crate) enum RecvFailure {
    TimedOut(Duration),
    Closed,
    Io(std::io::Error),
}

impl RecvFailure {
    fn into_error(self, command: &str) -> TelemetryError {
        let command = command.to_owned();
        match self {
            RecvFailure::TimedOut(timeout) => TelemetryError::ReadTimeout { command, timeout },
            RecvFailure::Closed => TelemetryError::ConnectionClosed { command },
            RecvFailure::Io(source) => TelemetryError::Receive { command, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &[u8] = b"/ethdev/xstats";

    #[test]
    fn boundary_found_in_single_chunk() {
        let response = br#"{"/ethdev/xstats": {"rx_bytes": 1}}"#;
        assert!(frame_boundary_reached(response, 0, PREFIX));
    }

    #[test]
    fn boundary_missing_keeps_reading() {
        let response = br#"{"/ethdev/info": {"name": "eth0"}}"#;
        assert!(!frame_boundary_reached(response, 0, PREFIX));
    }

    #[test]
    fn boundary_straddling_two_chunks_is_found() {
        let first = br#"{"/ethdev/xs"#;
        let second = br#"tats": {"rx_bytes": 1}}"#;
        assert!(!frame_boundary_reached(first, 0, PREFIX));
        assert!(!frame_boundary_reached(second, 0, PREFIX));

        let mut accumulated = first.to_vec();
        let previous_len = accumulated.len();
        accumulated.extend_from_slice(second);
        assert!(frame_boundary_reached(&accumulated, previous_len, PREFIX));
    }

    #[test]
    fn earlier_chunks_are_not_rescanned() {
        // The prefix sits fully inside bytes a previous iteration already checked.
        let mut accumulated = br#"{"/ethdev/xstats": {"#.to_vec();
        let previous_len = accumulated.len();
        accumulated.extend_from_slice(br#""rx_bytes": 1}}"#);
        assert!(!frame_boundary_reached(&accumulated, previous_len, PREFIX));
    }

    #[test]
    fn empty_prefix_is_always_complete() {
        assert!(frame_boundary_reached(b"{}", 0, b""));
    }
}
