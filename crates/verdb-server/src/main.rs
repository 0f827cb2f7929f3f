//! VerDB Server Binary
//!
//! API server for VerDB registries, versioned writes and jobs.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use verdb_common::CoreConfig;
use verdb_server::{create_router, AppState, ServerConfig};

#[derive(Parser)]
#[command(name = "verdb-server")]
#[command(about = "VerDB Temporal Versioning API Server")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "9090")]
    port: u16,

    /// Data directory for the engine snapshot (enables persistence)
    #[arg(short, long)]
    data_dir: Option<String>,

    /// TOML file with core settings
    #[arg(short, long)]
    config: Option<String>,

    /// Override the job concurrency ceiling
    #[arg(long)]
    max_running_jobs: Option<usize>,

    /// Seconds between snapshot saves
    #[arg(long, default_value = "30")]
    save_interval: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut core = match args.config {
        Some(ref path) => match CoreConfig::from_file(path) {
            Ok(core) => core,
            Err(e) => {
                tracing::error!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => CoreConfig::default(),
    };
    if let Some(max) = args.max_running_jobs {
        core = core.with_max_running_jobs(max);
    }

    let mut config = ServerConfig::new(&args.host, args.port)
        .with_data_dir(args.data_dir.clone())
        .with_core(core);
    config.save_interval_secs = args.save_interval;
    let addr: SocketAddr = config.socket_addr();

    if let Some(ref data_dir) = args.data_dir {
        tracing::info!("Persistence enabled, data directory: {}", data_dir);
    } else {
        tracing::warn!("No data directory specified, running in-memory only (data will be lost on restart)");
    }

    tracing::info!("Starting VerDB Server on {}", addr);
    tracing::info!(
        "Metadata in '{}', at most {} running jobs",
        config.core.meta_database,
        config.core.max_running_jobs
    );

    let save_interval = config.save_interval();
    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize state: {}", e);
            std::process::exit(1);
        }
    };
    let state_for_shutdown = state.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("VerDB Server listening on http://{}", addr);

    // Start periodic save task if persistence is enabled
    if args.data_dir.is_some() {
        let state_for_save = state_for_shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(save_interval);
            loop {
                interval.tick().await;
                let state = state_for_save.clone();
                match tokio::task::spawn_blocking(move || state.save_to_disk()).await {
                    Ok(Err(e)) => tracing::error!("Failed to save data: {}", e),
                    Err(e) => tracing::error!("Save task failed: {}", e),
                    Ok(Ok(())) => {}
                }
            }
        });
    }

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state_for_shutdown))
        .await
        .expect("Server error");
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, saving data...");
    if let Err(e) = state.save_to_disk() {
        tracing::error!("Failed to save data on shutdown: {}", e);
    } else {
        tracing::info!("Data saved successfully");
    }
}
