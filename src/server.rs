//! Local HTTP endpoint for `mallow serve`.
//!
//! Exposes the generation capability of an already-ensured model over
//! `POST /api/generate`. Path resolution and download correctness live in the
//! model subsystem; this listener is a thin transport over a loaded engine.

use crate::config::Config;
use crate::error::Result;
use crate::generate::Engine;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Generation failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: self.0 }),
        )
            .into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: state.engine.model_name().to_string(),
    })
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> std::result::Result<Json<GenerateResponse>, ApiError> {
    let response = state
        .engine
        .generate(&request.prompt)
        .await
        .map_err(|e| ApiError(e.to_string()))?;

    Ok(Json(GenerateResponse {
        model: state.engine.model_name().to_string(),
        response,
    }))
}

/// Build the API router over a loaded engine.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .with_state(AppState { engine })
}

/// Run the listener until ctrl-c.
pub async fn serve(config: &Config, engine: Engine) -> Result<()> {
    let addr = config.serve_addr();
    let app = router(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("API server running on http://{addr}");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install ctrl-c handler");
    }
}
