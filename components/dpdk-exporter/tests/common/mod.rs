#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dpdk_exporter::telemetry::{
    connection::connect,
    transport::{FrameLimits, TelemetryClient},
};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_seqpacket::UnixSeqpacketListener;

pub const GREETING: &str = r#"{"version": "DPDK 23.11.0", "pid": 4242, "max_output_len": 16384}"#;

/// Maps a received command to the messages sent back, one seqpacket each.
/// An empty reply closes the connection.
pub type Responder = Arc<dyn Fn(&str) -> Vec<Vec<u8>> + Send + Sync>;

/// Telemetry socket stand-in serving one client connection.
pub struct MockTelemetryServer {
    pub path: PathBuf,
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
    _dir: TempDir,
}

impl MockTelemetryServer {
    pub fn start(responder: Responder) -> Self {
        Self::start_with_greeting(GREETING, responder)
    }

    /// Same as [`MockTelemetryServer::start`] with a custom greeting frame.
    pub fn start_with_greeting(greeting: &str, responder: Responder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpdk_telemetry.v2");
        let listener = UnixSeqpacketListener::bind(&path).unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(serve(
            listener,
            responder,
            commands.clone(),
            Some(greeting.to_owned()),
        ));

        Self {
            path,
            commands,
            handle,
            _dir: dir,
        }
    }

    /// Server that accepts and immediately hangs up without a greeting.
    pub fn start_silent() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dpdk_telemetry.v2");
        let listener = UnixSeqpacketListener::bind(&path).unwrap();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(serve(
            listener,
            Arc::new(|_: &str| Vec::new()),
            commands.clone(),
            None,
        ));

        Self {
            path,
            commands,
            handle,
            _dir: dir,
        }
    }

    /// Commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub async fn connect(&self) -> TelemetryClient {
        self.connect_with(FrameLimits::default()).await
    }

    pub async fn connect_with(&self, limits: FrameLimits) -> TelemetryClient {
        connect(&self.path, 1, Duration::from_millis(10), limits)
            .await
            .unwrap()
    }
}

impl Drop for MockTelemetryServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Bind `path` and serve one connection with `responder`.
pub async fn serve_at(path: &Path, responder: Responder) {
    let listener = UnixSeqpacketListener::bind(path).unwrap();
    serve(
        listener,
        responder,
        Arc::new(Mutex::new(Vec::new())),
        Some(GREETING.to_owned()),
    )
    .await;
}

async fn serve(
    mut listener: UnixSeqpacketListener,
    responder: Responder,
    commands: Arc<Mutex<Vec<String>>>,
    greeting: Option<String>,
) {
    let Ok(socket) = listener.accept().await else {
        return;
    };
    let Some(greeting) = greeting else {
        return;
    };
    if socket.send(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut buffer = vec![0u8; 1024];
    loop {
        let n = match socket.recv(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let command = String::from_utf8_lossy(&buffer[..n]).into_owned();
        commands.lock().unwrap().push(command.clone());

        let reply = responder(&command);
        if reply.is_empty() {
            return;
        }
        for message in reply {
            if socket.send(&message).await.is_err() {
                return;
            }
        }
    }
}

/// One complete JSON answer in a single message.
pub fn single(json: &str) -> Vec<Vec<u8>> {
    vec![json.as_bytes().to_vec()]
}

/// Canned dp-service topology answering every command the poller issues.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Port id to interface name.
    pub ports: BTreeMap<u32, String>,
    /// Interface name to xstats.
    pub xstats: BTreeMap<String, BTreeMap<String, f64>>,
    pub nat_ports: BTreeMap<String, u64>,
    pub virtsvc_ports: Option<BTreeMap<String, u64>>,
    pub graph_calls: BTreeMap<String, f64>,
}

impl Topology {
    pub fn respond(&self, command: &str) -> Vec<Vec<u8>> {
        let (path, argument) = match command.split_once(',') {
            Some((path, argument)) => (path, argument.parse::<u32>().ok()),
            None => (command, None),
        };

        let payload = match (path, argument) {
            ("/ethdev/list", _) => serde_json::json!(self.ports.keys().collect::<Vec<_>>()),
            ("/ethdev/info", Some(id)) => match self.ports.get(&id) {
                Some(name) => serde_json::json!({"name": name, "state": 1, "mtu": 1500}),
                None => serde_json::Value::Null,
            },
            ("/ethdev/xstats", Some(id)) => {
                let stats = self
                    .ports
                    .get(&id)
                    .and_then(|name| self.xstats.get(name))
                    .cloned()
                    .unwrap_or_default();
                serde_json::json!(stats)
            }
            ("/dp_service/nat/used_port_count", _) => serde_json::json!(self.nat_ports),
            ("/dp_service/virtsvc/used_port_count", _) => match &self.virtsvc_ports {
                Some(ports) => serde_json::json!(ports),
                None => serde_json::Value::Null,
            },
            ("/dp_service/graph/call_count", _) => {
                serde_json::json!({"Node_0_to_255": self.graph_calls})
            }
            _ => serde_json::Value::Null,
        };

        let mut envelope = serde_json::Map::new();
        envelope.insert(path.to_owned(), payload);
        vec![serde_json::to_vec(&envelope).unwrap()]
    }
}

pub fn topology_responder(topology: Topology) -> Responder {
    Arc::new(move |command: &str| topology.respond(command))
}

/// Look up the value of one sample in a text exposition.
///
/// `labels` only has to be a subset of the sample's labels.
pub fn sample_value(exposition: &str, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
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

/// Text exposition lines of the two republished gauge families.
pub fn gauge_lines(exposition: &str) -> Vec<String> {
    exposition
        .lines()
        .filter(|line| {
            line.starts_with("dpdk_interface_stat") || line.starts_with("dpdk_graph_stat")
        })
        .map(str::to_owned)
        .collect()
}
