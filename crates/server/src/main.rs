//! `openapi-mcp`: serve one `OpenAPI` document as read-only MCP query tools over stdio.
//!
//! The document is loaded, resolved and indexed once before the MCP handshake; any failure
//! there exits non-zero without serving.

mod cli;
mod error;
mod handler;

use anyhow::Context as _;
use clap::Parser as _;
use cli::{Cli, LogFormat};
use handler::OpenApiMcpServer;
use openapi_mcp_index::load_index;
use rmcp::ServiceExt as _;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_format)?;

    let config = cli.source_config()?;
    let index = load_index(&config)
        .await
        .context("failed to load OpenAPI document")?;

    let server = OpenApiMcpServer::new(index);
    tracing::info!(tools = server.tools().len(), "Serving MCP over stdio");

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("MCP handshake failed")?;

    tokio::select! {
        res = service.waiting() => {
            let reason = res.context("MCP service task failed")?;
            tracing::info!("MCP session ended: {reason:?}");
        }
        () = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }
    Ok(())
}

fn init_tracing(level: Option<&str>, format: LogFormat) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
