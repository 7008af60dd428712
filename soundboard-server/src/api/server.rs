//! HTTP server setup and routing

use crate::config::Config;
use crate::error::{Error, Result};
use crate::library::SoundLibrary;
use crate::playback::PlaybackController;
use crate::ws::{ws_handler, NotificationHub, SessionHandler};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub library: Arc<SoundLibrary>,
    pub controller: Arc<PlaybackController>,
    pub hub: Arc<NotificationHub>,
    pub sessions: SessionHandler,
    pub config: Arc<Config>,
}

impl AppContext {
    /// Wire the session handler to the library, controller and hub.
    pub fn new(
        library: Arc<SoundLibrary>,
        controller: Arc<PlaybackController>,
        hub: Arc<NotificationHub>,
        config: Arc<Config>,
    ) -> Self {
        let sessions = SessionHandler::new(
            library.clone(),
            Arc::clone(&controller),
            Arc::clone(&hub),
            config.announce_stop_toggles,
            config.write_timeout,
        );

        Self {
            library,
            controller,
            hub,
            sessions,
            config,
        }
    }
}

/// Build the application router
pub fn build_router(ctx: AppContext) -> Router {
    let uploads = ServeDir::new(&ctx.config.uploads_folder);
    let static_files = ServeDir::new(&ctx.config.static_folder);
    let body_limit = ctx.config.max_upload_bytes;

    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Sound library
        .route("/api/sounds", get(super::handlers::list_sounds))
        .route(
            "/api/upload",
            post(super::handlers::upload_sound).layer(DefaultBodyLimit::max(body_limit)),
        )
        // Audio device listing
        .route("/api/audio/devices", get(super::handlers::list_audio_devices))
        // Control channel
        .route("/ws", get(ws_handler))
        // Uploaded files and web client
        .nest_service("/uploads", uploads)
        .fallback_service(static_files)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    let app = build_router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
