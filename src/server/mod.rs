//! # HTTP Server
//!
//! Upload, download and video-info endpoints around the enhancement pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    config::{Config, StorageConfig},
    error::Result,
    extract::{InfoExtractor, YtDlpExtractor},
    video::Enhancer,
};

pub mod api;
pub mod handlers;
pub mod storage;

pub use api::{ApiError, ApiResult, UploadResponse};

/// Shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageConfig>,
    pub enhancer: Enhancer,
    pub extractor: Arc<dyn InfoExtractor>,
}

impl AppState {
    pub fn new(storage: StorageConfig, enhancer: Enhancer, extractor: Arc<dyn InfoExtractor>) -> Self {
        Self {
            storage: Arc::new(storage),
            enhancer,
            extractor,
        }
    }

    /// Wire up the configured backend and extractor
    pub fn from_config(config: &Config) -> Result<Self> {
        let enhancer = Enhancer::from_config(&config.enhance)?;
        let extractor = Arc::new(YtDlpExtractor::from_config(&config.extractor));
        Ok(Self::new(config.storage.clone(), enhancer, extractor))
    }
}

/// All routes, with the upload body limit and HTTP tracing applied
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/download-file/{filename}", get(handlers::download_file))
        .route("/fetch-video-info", post(handlers::fetch_video_info))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bootstrap storage and serve until Ctrl+C
pub async fn serve(config: Config) -> Result<()> {
    storage::ensure_directories(&config.storage).await?;

    let state = AppState::from_config(&config)?;
    info!("Using {} video backend", state.enhancer.backend_name());
    info!("Uploads: {:?}, processed: {:?}", config.storage.upload_dir, config.storage.processed_dir);

    let app = router(state, config.server.max_upload_bytes);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = TcpListener::bind(addr).await?;
    info!("Video enhancer listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Failing to install the handler only loses graceful shutdown
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
    }
}
