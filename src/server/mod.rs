//! HTTP service: ImageKit upload proxy, storage setup and record lookup.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants::{MAX_FILE_SIZE, UPLOAD_IMAGEKIT_ROUTE};
use crate::error::{EvidenceError, Result};
use crate::hosting::ImageKitClient;
use crate::supabase::SupabaseClient;

/// Shared state for the handlers. A missing backend only disables the
/// routes that need it.
#[derive(Clone)]
pub struct AppState {
    pub imagekit: Option<Arc<ImageKitClient>>,
    pub supabase: Option<Arc<SupabaseClient>>,
    pub bucket: String,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let imagekit = ImageKitClient::from_config(&config.imagekit)
            .map_err(|e| warn!("ImageKit disabled: {}", e))
            .ok()
            .map(Arc::new);
        let supabase = SupabaseClient::from_config(config)
            .map_err(|e| warn!("Supabase disabled: {}", e))
            .ok()
            .map(Arc::new);

        Self {
            imagekit,
            supabase,
            bucket: config.supabase.bucket.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(UPLOAD_IMAGEKIT_ROUTE, post(routes::upload_imagekit))
        .route("/api/setup", get(routes::setup))
        .route("/api/revisiones/:id", get(routes::get_revision))
        // multipart framing on top of the largest accepted file
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE as usize + 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: &Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| EvidenceError::Config(format!("invalid listen address: {}", e)))?;

    let app = router(AppState::from_config(config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
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
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
