// External crates
use sysinfo::System;

/// Environment variable Kubernetes deployments set to the node name.
pub const NODE_NAME_ENV: &str = "NODE_NAME";

/// Label used when no source yields a host name.
pub const UNKNOWN_HOST: &str = "unknown";

/// Pick the host label for graph statistics.
///
/// Order: explicit override (flag or config), `NODE_NAME`, the system host
/// name. Empty values are skipped.
pub fn resolve_host_label(explicit: Option<&str>) -> String {
    resolve_from(
        explicit,
        std::env::var(NODE_NAME_ENV).ok().as_deref(),
        System::host_name().as_deref(),
    )
}

fn resolve_from(explicit: Option<&str>, node_name: Option<&str>, system: Option<&str>) -> String {
    if let Some(host) = non_empty(explicit) {
        return host.to_owned();
    }
    if let Some(host) = non_empty(node_name) {
        tracing::debug!(host_label = %host, "Using host label from {NODE_NAME_ENV}");
        return host.to_owned();
    }
    if let Some(host) = non_empty(system) {
        tracing::debug!(host_label = %host, "Using system host name as host label");
        return host.to_owned();
    }

    tracing::warn!("Could not determine a host name, labelling graph statistics as {UNKNOWN_HOST:?}");
    UNKNOWN_HOST.to_owned()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
