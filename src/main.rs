use clap::Parser;
use dotenvy::dotenv;
use drive_upload::config::UploadConfig;
use drive_upload::infrastructure::{database, storage};
use drive_upload::services::file_service::FileService;
use drive_upload::services::quota::QuotaService;
use drive_upload::services::upload::{ScratchSpace, UploadService, UploadTracker};
use drive_upload::services::worker::BackgroundWorker;
use drive_upload::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Scratch directory for chunk files (overrides SCRATCH_DIR)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_upload=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting drive upload service...");

    let mut config = UploadConfig::from_env();
    if let Some(dir) = args.scratch_dir {
        config.scratch_dir = dir;
    }
    info!(
        "🛡️  Upload limits: chunk={}MB, file={}MB, MINIO fallback={}",
        drive_upload::config::CHUNK_SIZE / 1024 / 1024,
        drive_upload::config::MAX_FILE_SIZE / 1024 / 1024,
        config.has_fallback_backend()
    );

    // 2. Setup Common Infrastructure
    let db = database::setup_database().await?;
    let blob = storage::setup_storage(&db, &config).await;
    let scratch = ScratchSpace::prepare(&config.scratch_dir).await?;
    info!("📁 Scratch directory: {:?}", scratch.root());

    let tracker = Arc::new(UploadTracker::new());
    let quota = QuotaService::new(db.clone());

    // 3. Setup Graceful Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // 4. Stale upload reaper (shares the in-process tracker)
    let worker = BackgroundWorker::new(tracker.clone(), quota.clone(), shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());
    info!("👷 Stale upload reaper initialized.");

    // 5. Initialize API Service
    let uploads = Arc::new(UploadService::new(
        db.clone(),
        blob.clone(),
        tracker,
        quota.clone(),
        scratch,
    ));
    let files = Arc::new(FileService::new(db.clone(), blob.clone(), quota.clone()));

    let state = AppState {
        db,
        blob,
        uploads,
        files,
        quota,
        config,
    };

    // Configure tracing layer for HTTP requests
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 6. Notify the reaper and wait for it
    info!("🛑 Shutting down upload services...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        error!("Background worker ended abnormally: {}", e);
    }

    info!("👋 Exited cleanly.");
    Ok(())
}

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
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("🛑 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
