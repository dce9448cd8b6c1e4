//! tagteam-gd - game data service
//!
//! Startup: load config, reconcile persisted state against the provider catalog,
//! then answer text queries. The HTTP listener comes up first so `/health` and
//! `/status` are reachable while the pipeline runs; queries get the not-ready
//! line until reconciliation reaches Ready.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tagteam_common::config::{default_config_path, load_toml_config, resolve_root_folder};
use tagteam_gd::config::GdConfig;
use tagteam_gd::provider::steam::{build_http_client, build_rate_limiter};
use tagteam_gd::provider::{CatalogProvider, DetailProvider, SteamCatalogClient, SteamDetailClient};
use tagteam_gd::reconcile::{ReconcileOutcome, ReconciliationDriver};
use tagteam_gd::{build_router, AppState};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MODULE_NAME: &str = "tagteam-gd";
const ROOT_FOLDER_ENV: &str = "TAGTEAM_ROOT_FOLDER";

/// Command-line arguments for tagteam-gd
#[derive(Parser, Debug)]
#[command(name = "tagteam-gd")]
#[command(about = "Game metadata service: catalog index, metadata fetch and text queries")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides [server] port)
    #[arg(short, long, env = "TAGTEAM_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides [server] host)
    #[arg(long, env = "TAGTEAM_HOST")]
    host: Option<String>,

    /// Folder holding the persisted index, skip set and store
    #[arg(short, long, env = "TAGTEAM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "TAGTEAM_CONFIG")]
    config: Option<PathBuf>,

    /// Run reconciliation once and exit without serving queries
    #[arg(long)]
    fetch_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let mut config: GdConfig = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GdConfig::default(),
    };

    init_tracing(&config.logging.level);
    info!("Starting tagteam-gd v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    config.apply_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate().context("Invalid configuration")?;

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        config.root_folder.as_deref(),
    );
    info!("Root folder: {}", root_folder.display());
    let files = config.files.data_files(&root_folder);

    let http_client =
        build_http_client(&config.provider).context("Failed to initialize HTTP client")?;
    let rate_limiter = build_rate_limiter(config.provider.requests_per_second);
    let catalog: Arc<dyn CatalogProvider> = Arc::new(SteamCatalogClient::new(
        http_client.clone(),
        &config.provider,
        Arc::clone(&rate_limiter),
    ));
    let details: Arc<dyn DetailProvider> = Arc::new(SteamDetailClient::new(
        http_client,
        &config.provider,
        rate_limiter,
    ));

    let state = AppState::new();
    let mut driver = ReconciliationDriver::new(catalog, details, files, config.pipeline.clone())
        .with_status(state.status.clone());

    if args.fetch_only {
        return match driver.reconcile().await {
            ReconcileOutcome::Ready(context) => {
                info!(shortfall = context.shortfall, "Fetch-only run complete");
                Ok(())
            }
            ReconcileOutcome::Blocked(reason) => Err(anyhow!("Reconciliation blocked: {reason}")),
        };
    }

    let app = build_router(state.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("tagteam-gd listening on http://{addr}");
    info!("Health check: http://{addr}/health");

    let shutdown = CancellationToken::new();
    let server = {
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        })
    };
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            token.cancel();
        });
    }

    let outcome = tokio::select! {
        outcome = driver.reconcile() => Some(outcome),
        _ = shutdown.cancelled() => None,
    };

    let result = match outcome {
        Some(ReconcileOutcome::Ready(context)) => {
            state.mark_ready(context).await;
            Ok(())
        }
        Some(ReconcileOutcome::Blocked(reason)) => {
            error!("Cannot serve queries: {}", reason);
            shutdown.cancel();
            Err(anyhow!("Reconciliation blocked: {reason}"))
        }
        None => {
            warn!("Shutdown requested before reconciliation finished");
            Ok(())
        }
    };

    server
        .await
        .context("Server task failed")?
        .context("Server error")?;
    info!("Server shutdown complete");
    result
}

/// RUST_LOG wins; otherwise the configured level applies to this service's crates
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tagteam_gd={level},tagteam_common={level},tower_http={level}"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
