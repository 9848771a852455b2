//! Human-approved marketing asset generation.
//!
//! The strategy service plans a campaign and parks it for approval; the
//! creative service generates captions, images and videos once approval is
//! published to it.

pub mod agent;
pub mod approval;
pub mod assets;
pub mod config;
pub mod constants;
pub mod consume;
pub mod domain;
pub mod error;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod task_generator;

use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Bind `0.0.0.0:{PORT}` and serve until the process exits. Connect info is
/// kept so per-IP rate limiting can fall back to the peer address.
pub async fn serve(app: Router, default_port: u16, service: &str) -> std::io::Result<()> {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.trim().parse::<u16>().ok())
        .unwrap_or(default_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(service, %addr, "[startup] Listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

/// CORS for the web frontend. Without `FRONTEND_URL` every origin is allowed,
/// which only suits local development.
pub fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let origin = match frontend_url.and_then(|u| u.parse().ok()) {
        Some(origin) => AllowOrigin::exact(origin),
        None => {
            tracing::warn!("[startup] FRONTEND_URL not set, allowing any origin");
            AllowOrigin::from(Any)
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
