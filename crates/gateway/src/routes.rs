//! `/api/browser/*` handlers.

use std::sync::Arc;

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{delete, get, post},
    },
    pilot_browser::{CommandResponse, DeleteOutcome, Session},
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::{info, warn},
};

use crate::{error::GatewayError, state::GatewayState};

pub fn browser_router() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/command", post(command_handler))
        .route("/session", delete(delete_session_handler))
        .route("/session/{chat_id}", get(session_handler))
        .route("/stop", post(stop_handler))
        .route("/unload", post(unload_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub chat_id: String,
    /// Reject messages the intent detector does not classify as commands.
    #[serde(default)]
    pub require_intent: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionRequest {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub chat_id: String,
}

async fn command_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, GatewayError> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(GatewayError::bad_request("message is required"));
    }
    if body.chat_id.trim().is_empty() {
        return Err(GatewayError::bad_request("chatId is required"));
    }
    let orchestrator = state.registry.get_or_create(&body.chat_id);
    let response = orchestrator
        .handle_message(message, body.require_intent)
        .await;
    info!(
        chat_id = %body.chat_id,
        success = response.success,
        results = response.results.len(),
        "command finished"
    );
    Ok(Json(response))
}

async fn delete_session_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<DeleteSessionRequest>,
) -> Result<Json<Value>, GatewayError> {
    let session_id = body.session_id.trim();
    if session_id.is_empty() {
        return Err(GatewayError::bad_request("sessionId is required"));
    }

    let outcome = match state.registry.find_by_session(session_id).await {
        Some(orchestrator) => {
            let outcome = orchestrator.close_session(session_id).await;
            // The chat has nothing left to hold; its next command starts fresh.
            if outcome.is_ok() {
                state.registry.remove(orchestrator.chat_id());
            }
            outcome
        },
        None => state.registry.services().api.delete_session(session_id).await,
    };

    let body = match outcome {
        Ok(DeleteOutcome::Deleted) => {
            json!({ "success": true, "message": format!("Session {session_id} closed") })
        },
        Ok(DeleteOutcome::AlreadyGone) => {
            json!({ "success": true, "message": format!("Session {session_id} was already closed") })
        },
        Err(e) => {
            warn!(session_id, error = %e, "session delete failed");
            json!({ "success": false, "error": e.to_string() })
        },
    };
    Ok(Json(body))
}

async fn session_handler(
    State(state): State<Arc<GatewayState>>,
    Path(chat_id): Path<String>,
) -> Json<Option<Session>> {
    let session = match state.registry.get(&chat_id) {
        Some(orchestrator) => orchestrator.session().await,
        None => None,
    };
    Json(session)
}

async fn stop_handler(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<ChatRequest>,
) -> Json<Value> {
    let cancelled = match state.registry.get(&body.chat_id) {
        Some(orchestrator) => orchestrator.stop().await,
        None => false,
    };
    Json(json!({ "success": true, "cancelled": cancelled }))
}

/// Beacon sent when the client page goes away. Starts a release and answers
/// immediately; completion is not reported. Beacons usually arrive as
/// `text/plain`, so the body is parsed regardless of content type.
async fn unload_handler(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let body: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::bad_request(format!("invalid unload body: {e}")))?;
    if let Some(orchestrator) = state.registry.remove(&body.chat_id) {
        tokio::spawn(async move {
            orchestrator.release().await;
        });
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}
