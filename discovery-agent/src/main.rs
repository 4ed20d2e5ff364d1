//! Discovery Agent Binary Entry Point

use clap::Parser;
use discovery_agent::logging::init_logging;
use discovery_agent::{run_agent, Args};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args.logging_config())?;

    // Ctrl-C stops the scan; the run still finishes and exports
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop signal received, stopping scan...");
            signal.cancel();
        }
    });

    let summary = run_agent(args, cancel).await?;
    if summary.failed {
        anyhow::bail!("Scan failed");
    }
    Ok(())
}
