//! HTTP request handlers
//!
//! Implements REST API endpoints for queue and playback control.

use crate::api::AppContext;
use crate::error::Error;
use crate::transport::ActorContext;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use segue_common::events::SessionState;
use segue_common::{MediaRef, Queue, QueueItem, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    actor_id: String,
    #[serde(default)]
    channel_id: Option<String>,
}

impl From<ActorRequest> for ActorContext {
    fn from(request: ActorRequest) -> Self {
        ActorContext {
            actor_id: request.actor_id,
            channel_id: request.channel_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    requester: String,
    url: String,
    title: String,
    #[serde(default)]
    thumbnail_url: Option<String>,
    actor: ActorRequest,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    actor: ActorRequest,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u32,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    state: String,
    queue_len: usize,
    revision: u64,
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "segue-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /api/v1/sessions/:session_id/queue - Queue snapshot
pub async fn get_queue(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
) -> Result<Json<Queue>, (StatusCode, Json<StatusResponse>)> {
    let session_id = SessionId::new(session_id);
    match ctx.registry.store().get_queue(&session_id).await {
        Ok(queue) => Ok(Json(queue)),
        Err(e) => {
            error!("Failed to load queue for session {}: {}", session_id, e);
            Err(error_response(&e))
        }
    }
}

/// POST /api/v1/sessions/:session_id/queue - Enqueue an item
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<Queue>, (StatusCode, Json<StatusResponse>)> {
    if let Err(e) = validate_enqueue(&request) {
        return Err(error_response(&e));
    }

    let session_id = SessionId::new(session_id);
    let item = QueueItem {
        requester: request.requester,
        media: MediaRef {
            url: request.url,
            title: request.title,
        },
        thumbnail_url: request.thumbnail_url,
    };

    let handle = ctx.registry.session(&session_id).await;
    match handle.enqueue(item, request.actor.into()).await {
        Ok(queue) => {
            info!(
                "Enqueued item for session {} (queue length {})",
                session_id,
                queue.len()
            );
            Ok(Json(queue))
        }
        Err(e) => {
            error!("Failed to enqueue for session {}: {}", session_id, e);
            Err(error_response(&e))
        }
    }
}

fn validate_enqueue(request: &EnqueueRequest) -> Result<(), Error> {
    if request.url.trim().is_empty() {
        return Err(Error::BadRequest("url must not be empty".to_string()));
    }
    if request.requester.trim().is_empty() {
        return Err(Error::BadRequest("requester must not be empty".to_string()));
    }
    Ok(())
}

// ============================================================================
// Playback Endpoints
// ============================================================================

/// POST /api/v1/sessions/:session_id/playback/start - Kick playback
///
/// Accepted means the session will attempt to play its head; join and
/// stream failures arrive as notifications, not as this response.
pub async fn start_playback(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), (StatusCode, Json<StatusResponse>)> {
    let session_id = SessionId::new(session_id);
    let handle = ctx.registry.session(&session_id).await;
    match handle.start(request.actor.into()).await {
        Ok(()) => {
            info!("Playback start accepted for session {}", session_id);
            Ok((
                StatusCode::ACCEPTED,
                Json(StatusResponse {
                    status: "accepted".to_string(),
                }),
            ))
        }
        Err(e) => {
            error!("Failed to start playback for session {}: {}", session_id, e);
            Err(error_response(&e))
        }
    }
}

/// GET /api/v1/sessions/:session_id/state - Session playback state
pub async fn get_state(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
) -> Result<Json<StateResponse>, (StatusCode, Json<StatusResponse>)> {
    let session_id = SessionId::new(session_id);
    let state = match ctx.registry.peek(&session_id).await {
        Some(handle) => handle.state().await,
        None => SessionState::Idle,
    };
    match ctx.registry.store().get_queue(&session_id).await {
        Ok(queue) => Ok(Json(StateResponse {
            state: state.to_string(),
            queue_len: queue.len(),
            revision: queue.revision,
        })),
        Err(e) => {
            error!("Failed to load state for session {}: {}", session_id, e);
            Err(error_response(&e))
        }
    }
}

// ============================================================================
// Volume Endpoints
// ============================================================================

/// GET /api/v1/sessions/:session_id/volume - Current session volume
pub async fn get_volume(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
) -> Result<Json<VolumeResponse>, (StatusCode, Json<StatusResponse>)> {
    let session_id = SessionId::new(session_id);
    match ctx.registry.store().get_queue(&session_id).await {
        Ok(queue) => Ok(Json(VolumeResponse {
            volume: queue.volume,
        })),
        Err(e) => {
            error!("Failed to load volume for session {}: {}", session_id, e);
            Err(error_response(&e))
        }
    }
}

/// POST /api/v1/sessions/:session_id/volume - Set session volume
///
/// The persisted volume changes immediately; the audible gain changes at
/// the next track advance.
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<VolumeResponse>, (StatusCode, Json<StatusResponse>)> {
    let session_id = SessionId::new(session_id);
    let handle = ctx.registry.session(&session_id).await;
    match handle.set_volume(request.volume).await {
        Ok(queue) => {
            info!("Session {} volume set to {}", session_id, request.volume);
            Ok(Json(VolumeResponse {
                volume: queue.volume,
            }))
        }
        Err(e) => {
            error!("Failed to set volume for session {}: {}", session_id, e);
            Err(error_response(&e))
        }
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

fn error_response(error: &Error) -> (StatusCode, Json<StatusResponse>) {
    let status = match error {
        Error::NotInChannel => StatusCode::CONFLICT,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", error),
        }),
    )
}
