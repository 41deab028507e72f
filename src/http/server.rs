//! HTTP server and the demo router.

use axum::http::Uri;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::middleware::{enforce, Admission, AdmissionOptions};
use crate::error::{Result, TurnstileError};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct EchoResponse {
    success: bool,
    path: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "turnstile",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Stand-in for downstream API handlers.
async fn echo(uri: Uri) -> Json<EchoResponse> {
    Json(EchoResponse {
        success: true,
        path: uri.path().to_string(),
    })
}

/// Build the application router: `/health` unguarded, `/api/*` behind admission.
pub fn router(admission: Arc<Admission>) -> Router {
    let guarded = Router::new()
        .route("/api", any(echo))
        .route("/api/*path", any(echo))
        .layer(axum::middleware::from_fn_with_state(
            admission.layer_state(AdmissionOptions::new()),
            enforce,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the admission service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    app: Router,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, admission: Arc<Admission>) -> Self {
        Self {
            addr,
            app: router(admission),
        }
    }

    /// Start the server. The server shuts down when `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(listener, self.app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TurnstileError::Server(e.to_string())
            })
    }
}
