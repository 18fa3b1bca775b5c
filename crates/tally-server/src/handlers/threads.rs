//! Thread and message handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{AppError, AppState, MAX_BODY_SIZE};
use tally_core::error::Error as CoreError;
use tally_core::models::Thread;
use tally_core::{ThreadOptions, UserPart, FAILED_TURN_REPLY};

/// Request body for creating a thread
#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub user_id: i64,
    /// "normal" (default) or "finance"
    pub assistant_type: Option<String>,
    #[serde(default)]
    pub web_search: bool,
}

/// POST /api/threads - Create a new conversation thread
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Thread>, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: CreateThreadRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let assistant_type = match req.assistant_type.as_deref() {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::bad_request(&format!("Unknown assistant type: {}", raw)))?,
        None => Default::default(),
    };

    let thread = state.service.create_thread(
        req.user_id,
        ThreadOptions {
            assistant_type,
            web_search: req.web_search,
        },
    )?;

    Ok(Json(thread))
}

/// An image attached to a message, base64-encoded
#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub media_type: String,
    pub data: String,
}

/// Request body for posting a message to a thread
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
    /// When set, the message joins a media group and is debounced with
    /// the other messages carrying the same ID.
    pub media_group_id: Option<String>,
}

/// Response body for a posted message
///
/// `reply` is None for media-group followers; the first message of the
/// group carries the merged reply.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: Option<String>,
}

/// POST /api/threads/:id/messages - Run one assistant turn
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<MessageResponse>, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: PostMessageRequest =
        serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))?;

    let parts = build_parts(&req)?;
    if parts.is_empty() {
        return Err(AppError::bad_request("Message has no content"));
    }

    let outcome = match req.media_group_id.as_deref() {
        Some(group_id) => {
            state
                .service
                .submit_media_group_turn(id, group_id, parts)
                .await
        }
        None => state.service.submit_user_turn(id, parts).await.map(Some),
    };

    match outcome {
        Ok(reply) => Ok(Json(MessageResponse { reply })),
        Err(CoreError::NotFound(msg)) => Err(AppError::not_found(&msg)),
        Err(CoreError::InvalidData(msg)) => Err(AppError::bad_request(&msg)),
        Err(err) => {
            // The user gets a fixed apology; the detail stays in the logs,
            // with provider failures kept apart from loop/internal ones.
            if err.is_provider_failure() {
                error!(error = %err, thread_id = id, "Provider failure during turn");
            } else {
                error!(error = %err, thread_id = id, "Turn failed");
            }
            Ok(Json(MessageResponse {
                reply: Some(FAILED_TURN_REPLY.to_string()),
            }))
        }
    }
}

fn build_parts(req: &PostMessageRequest) -> Result<Vec<UserPart>, AppError> {
    let mut parts = Vec::new();

    if let Some(text) = req.text.as_deref() {
        if !text.trim().is_empty() {
            parts.push(UserPart::Text(text.to_string()));
        }
    }

    for image in &req.images {
        let data = base64::engine::general_purpose::STANDARD
            .decode(&image.data)
            .map_err(|_| AppError::bad_request("Invalid base64 image data"))?;
        parts.push(UserPart::Image {
            media_type: image.media_type.clone(),
            data,
        });
    }

    Ok(parts)
}
