use anyhow::Result;
use axum::Router;
use catalog_server::{build_app, load_engine};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "catalog-server", about = "HTTP API for catalogue search")]
struct Args {
    /// Dataset path (.json, .jsonl or a directory of them)
    #[arg(long, env = "CATALOG_DATASET", default_value = "./data-set.json")]
    dataset: PathBuf,
    /// Optional engine configuration (JSON)
    #[arg(long, env = "CATALOG_CONFIG")]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, env = "CATALOG_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "CATALOG_PORT", default_value_t = 8080)]
    port: u16,
    /// Token required in X-ADMIN-TOKEN for admin routes
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let engine = load_engine(&args.dataset, args.config.as_deref())?;
    let app: Router = build_app(engine, args.admin_token);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
