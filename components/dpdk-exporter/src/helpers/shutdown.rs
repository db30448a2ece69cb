// External crates
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Process-wide shutdown handle, built on-top of a `CancellationToken`.
///
/// - Each long-running task receives a child token from `.child()`.
/// - Calling `.trigger()` cancels every child at once.
/// - `.wait_for_signal()` resolves on SIGINT or SIGTERM, whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one task; cancelled together with this handle.
    pub fn child(&self) -> CancellationToken {
        self.token.child_token()
    }

    #[instrument(
        name = "dpdk_exporter_shutdown_trigger",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered, cancelling exporter tasks");
        self.token.cancel();
    }

    /// Block until the process receives SIGINT or SIGTERM.
    #[instrument(
        name = "dpdk_exporter_shutdown_waiter",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        tracing::info!("Shutdown signal received");
        Ok(())
    }
}
