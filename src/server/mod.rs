//! HTTP front door: capture endpoint, binding probe, chat-agent routes,
//! 404 fallback for everything else.

pub mod chat;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::multipart::Multipart;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::agent::session::SessionStore;
use crate::capture::validate::{FilePart, FormValue, RawCaptureForm};
use crate::errors::ScoutResult;
use crate::llm::registry::ProviderRegistry;

/// Uploads above the validator's 5 MiB cap must still reach the validator so
/// it can answer 413 itself, so the framework limit sits well above it.
const BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Application state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check-ai-binding", get(check_ai_binding))
        .route("/capture", post(capture))
        .route("/agents/chat", post(chat::chat))
        .route("/agents/chat/confirm", post(chat::confirm))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> ScoutResult<()> {
    let app = router(state);
    tracing::info!(%addr, "HTTP server listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

async fn check_ai_binding(State(state): State<AppState>) -> impl IntoResponse {
    let success = state.registry.binding_configured();
    Json(serde_json::json!({ "success": success }))
}

async fn capture(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let form = match read_capture_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::debug!(error = %e, "multipart read failed");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "ok": false, "error": "Malformed multipart body." })),
            );
        }
    };

    let (status, response) = crate::capture::run(&state.registry, form).await;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_value(&response).unwrap_or_else(
        |_| serde_json::json!({ "ok": false, "error": "Internal serialization error." }),
    );
    (status, Json(body))
}

/// Pull the `goal` and `image` fields out of the multipart stream without
/// judging them; the validator owns all the judging.
async fn read_capture_form(mut multipart: Multipart) -> Result<RawCaptureForm, axum::Error> {
    let mut form = RawCaptureForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(axum::Error::new)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            "goal" => Slot::Goal,
            "image" => Slot::Image,
            _ => {
                // Unknown fields are drained and ignored.
                let _ = field.bytes().await.map_err(axum::Error::new)?;
                continue;
            }
        };

        let value = if let Some(filename) = field.file_name().map(str::to_string) {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(axum::Error::new)?;
            FormValue::File(FilePart {
                filename,
                content_type,
                bytes,
            })
        } else {
            FormValue::Text(field.text().await.map_err(axum::Error::new)?)
        };

        match slot {
            Slot::Goal => form.goal = Some(value),
            Slot::Image => form.image = Some(value),
        }
    }

    Ok(form)
}

enum Slot {
    Goal,
    Image,
}
