// External crates
use std::fmt;

/// Interface identifier as reported by `/ethdev/list`.
pub type PortId = u32;

pub const ETHDEV_LIST: &str = "/ethdev/list";
pub const ETHDEV_INFO: &str = "/ethdev/info";
pub const ETHDEV_XSTATS: &str = "/ethdev/xstats";
pub const NAT_USED_PORT_COUNT: &str = "/dp_service/nat/used_port_count";
pub const VIRTSVC_USED_PORT_COUNT: &str = "/dp_service/virtsvc/used_port_count";
pub const GRAPH_CALL_COUNT: &str = "/dp_service/graph/call_count";

/// The fixed set of telemetry commands the poller issues.
///
/// `Display` renders the exact wire string, `path,argument` for the per-port
/// commands and the bare path otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    EthdevList,
    EthdevInfo(PortId),
    EthdevXstats(PortId),
    NatUsedPortCount,
    VirtsvcUsedPortCount,
    GraphCallCount,
}

/// Shape of the JSON payload a command answers with.
///
/// The decoder is not self-describing, so the caller picks the shape from the
/// command it sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    EthdevList,
    EthdevInfo,
    EthdevXstats,
    NatPortUsage,
    VirtsvcPortUsage,
    GraphCallCount,
}

impl Command {
    /// Wire path without the argument, also the top-level key of the response.
    pub const fn path(&self) -> &'static str {
        self.kind().path()
    }

    pub const fn kind(&self) -> ResponseKind {
        match self {
            Command::EthdevList => ResponseKind::EthdevList,
            Command::EthdevInfo(_) => ResponseKind::EthdevInfo,
            Command::EthdevXstats(_) => ResponseKind::EthdevXstats,
            Command::NatUsedPortCount => ResponseKind::NatPortUsage,
            Command::VirtsvcUsedPortCount => ResponseKind::VirtsvcPortUsage,
            Command::GraphCallCount => ResponseKind::GraphCallCount,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::EthdevInfo(id) | Command::EthdevXstats(id) => {
                write!(f, "{},{}", self.path(), id)
            }
            _ => f.write_str(self.path()),
        }
    }
}

impl ResponseKind {
    pub const fn path(&self) -> &'static str {
        match self {
            ResponseKind::EthdevList => ETHDEV_LIST,
            ResponseKind::EthdevInfo => ETHDEV_INFO,
            ResponseKind::EthdevXstats => ETHDEV_XSTATS,
            ResponseKind::NatPortUsage => NAT_USED_PORT_COUNT,
            ResponseKind::VirtsvcPortUsage => VIRTSVC_USED_PORT_COUNT,
            ResponseKind::GraphCallCount => GRAPH_CALL_COUNT,
        }
    }
}

/// Portion of a raw command before its first comma.
///
/// The server echoes this path as the top-level key of its JSON answer, which
/// is what the framing transport looks for.
pub fn path_prefix(command: &str) -> &str {
    match command.split_once(',') {
        Some((path, _)) => path,
        None => command,
    }
}
