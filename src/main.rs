use anyhow::{Context as _, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use studyd::{config::AppConfig, rest, storage::Storage, AppContext};

#[derive(Parser)]
#[command(name = "studyd", about = "StudySmart — productivity tracking backend", version)]
struct Args {
    /// REST server port
    #[arg(long, env = "STUDYD_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "STUDYD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STUDYD_LOG")]
    log: Option<String>,

    /// Bind address for the REST server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "STUDYD_BIND")]
    bind_address: Option<String>,
}

fn setup_logging(log_level: &str, log_format: &str) {
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::new(args.port, args.data_dir, args.log, args.bind_address);
    setup_logging(&config.log, &config.log_format);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "studyd starting"
    );

    let storage = Storage::new_with_slow_query(
        &config.data_dir,
        config.observability.slow_query_threshold_ms,
    )
    .await
    .context("opening database")?;

    let ctx = Arc::new(AppContext::new(Arc::new(config), Arc::new(storage)));
    rest::serve(ctx).await
}
