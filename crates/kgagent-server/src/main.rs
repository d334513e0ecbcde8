//! HTTP entry point for the kgagent REST API.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kgagent_core::AppConfig;
use kgagent_graph::{GraphClient, GraphConfig};
use kgagent_server::{build_router, AppState};

#[derive(Parser)]
#[command(name = "kgagent-server")]
#[command(about = "REST API for the kgagent temporal knowledge graph")]
struct Cli {
    /// Config file prefix (default: kgagent, i.e. kgagent.toml).
    #[arg(short, long, default_value = "kgagent")]
    config: String,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    fmt().with_env_filter(filter).json().init();

    config.validate()?;

    let graph = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
    graph.ping().await?;
    graph
        .ensure_schema(
            config.openai.embedding_dimensions,
            config.openai.use_embeddings,
        )
        .await?;

    tokio::fs::create_dir_all(&config.upload.dir).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, graph)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, version = env!("CARGO_PKG_VERSION"), "kgagent API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
