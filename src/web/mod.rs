//! HTTP API.
//!
//! A thin JSON layer over [`Services`]: every handler validates its input,
//! calls one service operation and wraps the result in `{message, data}`.

pub mod routes;

use crate::services::Services;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Largest accepted request body, slideshow uploads carry several images
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),

    #[error("Server error: {0}")]
    ServerError(String),
}

pub struct WebServer {
    services: Arc<Services>,
}

impl WebServer {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/api/settings",
                get(routes::get_settings).patch(routes::apply_settings),
            )
            .route("/api/detect-display", get(routes::detect_display))
            .route("/api/current-image", get(routes::get_current_image))
            .route(
                "/api/slideshow",
                get(routes::get_slideshow).post(routes::update_slideshow),
            )
            .route(
                "/api/image-feed",
                get(routes::get_image_feed).post(routes::update_image_feed),
            )
            .route("/api/utils/dither", post(routes::dither_image))
            .route("/health", get(routes::health))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(Arc::clone(&self.services))
    }

    /// Run the web server with graceful shutdown
    pub async fn run_with_shutdown(
        &self,
        port: u16,
        shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), WebError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Web server listening on http://{}", addr);

        let mut shutdown = shutdown;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Web server shutting down gracefully");
            })
            .await
            .map_err(|e| WebError::ServerError(e.to_string()))
    }
}
