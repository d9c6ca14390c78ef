use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use contents_server::{api, state::AppState};

fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,hyper_util=warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .compact()
    .try_init()
    .ok();
}

#[derive(Parser, Debug)]
#[command(
  name = "contents_server",
  version,
  about = "Serve a directory tree as a JSON contents API with per-file checkpoints"
)]
struct Cli {
  /// Directory served as the root of the contents namespace.
  #[arg(long, env = "CONTENTS_ROOT", default_value = ".")]
  root: PathBuf,
  /// Address the HTTP listener binds to.
  #[arg(long, env = "CONTENTS_BIND", default_value = "127.0.0.1:8888")]
  bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let root = std::fs::canonicalize(&cli.root)
    .with_context(|| format!("root directory {} is not accessible", cli.root.display()))?;
  let app = api::router(AppState::new(root.clone()));
  let listener = tokio::net::TcpListener::bind(cli.bind)
    .await
    .with_context(|| format!("failed to bind {}", cli.bind))?;
  info!(addr = %cli.bind, root = %root.display(), "contents service listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server exited with an error")?;
  Ok(())
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_err() {
    warn!("failed to install the shutdown signal handler");
  }
}
