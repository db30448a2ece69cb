// Local crates
use crate::{
    helpers::{hostname::resolve_host_label, load_config::Config},
    instrumentation, runtime,
};

// External crates
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "dpdk-exporter",
    long_about = "Polls the DPDK / dp-service telemetry socket and exposes interface and graph statistics as Prometheus gauges.",
    about = "Prometheus exporter for the DPDK telemetry socket",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        dpdk-exporter run --hostname node-1 --poll-interval 20
        dpdk-exporter run --config /etc/dpdk_exporter.toml
        dpdk-exporter query /ethdev/xstats,0
        dpdk-exporter validate --config ./dpdk_exporter.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the exporter
    Run(RunArgs),

    /// Send a single telemetry command and print the raw answer
    Query {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Telemetry socket, overrides `telemetry.socket_path`
        #[arg(long)]
        socket_path: Option<PathBuf>,

        /// Command string, e.g. `/ethdev/list` or `/ethdev/info,0`
        command: String,
    },

    /// Validate the configuration file before running
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Display version information
    Version,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hostname to use as `node_name` on graph statistics
    #[arg(long)]
    hostname: Option<String>,

    /// Polling interval in seconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Telemetry socket, overrides `telemetry.socket_path`
    #[arg(long)]
    socket_path: Option<PathBuf>,

    /// Address the `/metrics` endpoint listens on
    #[arg(long)]
    listen_addr: Option<SocketAddr>,
}

impl RunArgs {
    /// Layer the command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(hostname) = &self.hostname {
            config.general.hostname = Some(hostname.clone());
        }
        if let Some(poll_interval) = self.poll_interval {
            config.telemetry.poll_interval_secs = poll_interval;
        }
        if let Some(socket_path) = &self.socket_path {
            config.telemetry.socket_path = socket_path.clone();
        }
        if let Some(listen_addr) = self.listen_addr {
            config.server.listen_addr = listen_addr;
        }
    }
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_exporter(args).await?,
        Commands::Query {
            config,
            socket_path,
            command,
        } => query(config.as_deref(), socket_path, &command).await?,
        Commands::Validate { config } => validate_config(&config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

async fn run_exporter(args: RunArgs) -> Result<()> {
    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    anyhow::ensure!(
        config.telemetry.poll_interval_secs > 0,
        "--poll-interval must be greater than 0"
    );

    let _log_guard = instrumentation::tracing::init_tracing(&config.logging)?;
    instrumentation::tracing::init_panic_handler();

    let host_label = resolve_host_label(config.general.hostname.as_deref());
    tracing::info!(
        host_label = %host_label,
        socket_path = %config.telemetry.socket_path.display(),
        listen_addr = %config.server.listen_addr,
        "Starting DPDK exporter {}",
        env!("CARGO_PKG_VERSION")
    );

    runtime::runtime::run_exporter(config, host_label).await
}

async fn query(config: Option<&Path>, socket_path: Option<PathBuf>, command: &str) -> Result<()> {
    let mut config = Config::load_or_default(config)?;
    if let Some(socket_path) = socket_path {
        config.telemetry.socket_path = socket_path;
    }
    // One-shot use: fail fast instead of waiting through the daemon's retries.
    config.telemetry.max_connect_attempts = 1;

    let _log_guard = instrumentation::tracing::init_tracing(&config.logging)?;

    let output = runtime::runtime::run_query(&config, command).await?;
    println!("{output}");
    Ok(())
}

/// Validate configuration file
fn validate_config(config: &Path) -> Result<()> {
    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(config)?;
    println!("Configuration valid:\n{:#?}", cfg);
    Ok(())
}

/// Show version information
fn show_version() {
    println!("DPDK Exporter {}", env!("CARGO_PKG_VERSION"));
}
