//! Chat-agent routes: a streaming turn endpoint and the confirmation
//! endpoint that resumes a parked tool call.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use crate::agent::engine::{resolve_confirmation, run_chat_turn, CHAT_STEP_BUDGET};
use crate::llm::types::{StreamChunk, StreamChunkKind};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub session_id: Uuid,
    pub tool_call_id: String,
    pub approve: bool,
}

fn error_body(error: &str) -> serde_json::Value {
    serde_json::json!({ "ok": false, "error": error })
}

/// `POST /agents/chat`: runs one chat turn, streaming chunks as SSE.
/// The first event names the session so the client can continue it.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)>
{
    if !state.registry.binding_configured() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_body("AI binding not configured.")),
        ));
    }

    let (provider, mut cfg) = state
        .registry
        .call_config_for_role("chat", CHAT_STEP_BUDGET)
        .map_err(|e| {
            tracing::error!(error = %e, "chat role resolution failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(error_body("AI binding not configured.")),
            )
        })?;
    cfg.stream = true;

    let (session_id, session) = state.sessions.get_or_create(req.session_id).await;
    let (tx, rx) = mpsc::channel::<StreamChunk>(32);

    tokio::spawn(async move {
        let mut session = session.lock().await;
        if let Err(e) = run_chat_turn(provider, cfg, &mut session, req.message, tx.clone()).await {
            tracing::error!(error = %e, session = %session_id, "chat turn failed");
            let _ = tx
                .send(StreamChunk {
                    kind: StreamChunkKind::Error,
                    content: "Chat turn failed.".into(),
                })
                .await;
        }
    });

    let session_event = Event::default()
        .event("session")
        .data(session_id.to_string());
    let chunks = ReceiverStream::new(rx).map(|chunk| {
        Event::default()
            .json_data(&chunk)
            .unwrap_or_else(|_| Event::default().event("error").data("serialization failed"))
    });
    let stream = tokio_stream::once(session_event).chain(chunks).map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /agents/chat/confirm`: approve or reject the session's parked
/// tool call and return the model's follow-up reply.
pub async fn confirm(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> impl IntoResponse {
    if !state.registry.binding_configured() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(error_body("AI binding not configured.")),
        );
    }

    let Some(session) = state.sessions.get(req.session_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(error_body("Unknown session.")),
        );
    };

    let (provider, cfg) = match state.registry.call_config_for_role("chat", CHAT_STEP_BUDGET) {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "chat role resolution failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(error_body("AI binding not configured.")),
            );
        }
    };

    let mut session = session.lock().await;
    match resolve_confirmation(provider, cfg, &mut session, &req.tool_call_id, req.approve).await {
        Ok(content) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "content": content })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, session = %req.session_id, "confirmation failed");
            (
                StatusCode::CONFLICT,
                Json(error_body("No matching pending tool call.")),
            )
        }
    }
}
