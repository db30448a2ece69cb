use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Main entrypoint simply delegates control to CLI layer.
    // Tracing is installed there, once the logging configuration is known.
    dpdk_exporter::cli::cli::run().await
}
