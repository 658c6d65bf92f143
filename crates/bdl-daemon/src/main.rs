#![deny(unsafe_code)]
use anyhow::{Context, Result};
use bdl_daemon::{AppState, build_app};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bdl-daemon", version, about = "BrainDrive library service daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8099")]
    bind: String,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("bdl=debug")
    } else {
        EnvFilter::new("bdl=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = bdl_config::load_config().context("load configuration")?;
    std::fs::create_dir_all(&config.library_path)
        .with_context(|| format!("create library root {}", config.library_path.display()))?;

    let state = AppState {
        config: Arc::new(config),
    };
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "bdl-daemon listening");

    axum::serve(listener, app).await.context("serve")
}
