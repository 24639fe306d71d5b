//! mail-dispatch - Entry point for one-shot email dispatch jobs

use anyhow::{Context, Result};
use mail_dispatch::config::DispatchRequest;
use mail_dispatch::DispatchService;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // Initialize logging; stdout is reserved for the result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        tracing::error!("Dispatch failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: mail-dispatch <request.json>")?;
    let request = DispatchRequest::load(&path)
        .with_context(|| format!("failed to load dispatch request {}", path))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling at the next attachment");
            on_interrupt.cancel();
        }
    });

    tracing::info!(job = %path, "Starting dispatch");
    let result = DispatchService::new().run(&request, &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
