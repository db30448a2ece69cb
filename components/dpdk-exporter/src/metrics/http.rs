// External crates
use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming,
    header::{CONTENT_TYPE, HeaderValue},
    http::{Method, Request, Response, StatusCode},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder as HyperServerBuilder,
};
use prometheus::{Encoder, Registry, TEXT_FORMAT, TextEncoder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Path the exposition is served on.
pub const METRICS_PATH: &str = "/metrics";

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Encode every family on `registry` in the Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// Look up the value of one sample in a text exposition.
///
/// `labels` only has to be a subset of the sample's labels.
#[cfg(test)]
pub(crate) fn sample_value(exposition: &str, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let family_prefix = format!("{family}{{");
    exposition
        .lines()
        .filter(|line| line.starts_with(&family_prefix))
        .find(|line| {
            labels
                .iter()
                .all(|(name, value)| line.contains(&format!("{name}=\"{value}\"")))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

/// Build the response for one request. Only `GET /metrics` is served.
#[instrument(
    name = "dpdk_exporter_metrics_server::respond",
    target = "metrics::http",
    skip(registry),
    level = "debug"
)]
pub fn respond(method: &Method, path: &str, registry: &Registry) -> Response<Full<Bytes>> {
    if *method != Method::GET || path != METRICS_PATH {
        return plain_response(StatusCode::NOT_FOUND, "Not Found");
    }

    match encode_metrics(registry) {
        Ok(buffer) => {
            tracing::debug!(
                response_len = buffer.len(),
                "Encoded registry into prometheus text format"
            );
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode prometheus metrics");
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Serve `registry` on `addr` until `cancel` fires.
///
/// Binding failures are returned; errors on individual connections are logged
/// and never stop the accept loop.
#[instrument(
    name = "dpdk_exporter_metrics_server::serve",
    target = "metrics::http",
    skip(registry, cancel),
    level = "debug"
)]
pub async fn serve_metrics(
    addr: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        metrics_endpoint = %addr,
        "DPDK exporter metrics available at http://{addr}{METRICS_PATH}"
    );

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Metrics server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept metrics connection");
                    if !backoff_after_accept_error(&cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let registry = registry.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let response = respond(req.method(), req.uri().path(), &registry);
            async move { Ok::<_, std::convert::Infallible>(response) }
        });

        tracing::trace!(peer = %peer, "Spawning task for metrics connection");
        tokio::spawn(async move {
            if let Err(err) = HyperServerBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::error!(error = %err, "Metrics server connection error");
            }
        });
    }
}

/// Sleep for [`ACCEPT_ERROR_BACKOFF`]; false when `cancel` fired first.
///
/// Accept errors such as EMFILE persist until descriptors are released.
async fn backoff_after_accept_error(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}
