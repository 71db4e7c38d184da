//! Event types for the Segue event system
//!
//! Engine components emit [`PlayerEvent`]s on the shared [`EventBus`]
//! (tokio broadcast). The HTTP layer re-serves the bus over SSE; nothing in
//! the engine ever blocks on a slow subscriber.

use crate::model::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback session state as observed from outside the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No active stream. The transport may still be held (e.g. stalled on a
    /// stream error awaiting manual recovery).
    Idle,
    /// Join in progress.
    AcquiringTransport,
    /// One item actively playing.
    Streaming,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AcquiringTransport => write!(f, "acquiring_transport"),
            SessionState::Streaming => write!(f, "streaming"),
        }
    }
}

/// Segue event types
///
/// Events are broadcast via [`EventBus`] and serialized for SSE
/// transmission. All events carry the session they concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Streaming of the head item started.
    NowPlaying {
        session_id: SessionId,
        /// Display title, HTML entities already decoded.
        title: String,
        url: String,
        requester: String,
        thumbnail_url: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The queue drained: volume reset and transport released.
    QueueFinished {
        session_id: SessionId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed (enqueue or head pop).
    QueueChanged {
        session_id: SessionId,
        len: usize,
        revision: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session volume changed (applies from the next advance).
    VolumeChanged {
        session_id: SessionId,
        volume: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session actor state transition.
    SessionStateChanged {
        session_id: SessionId,
        state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A user-visible playback failure (join precondition, stream error,
    /// exhausted store retries).
    PlaybackError {
        session_id: SessionId,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::NowPlaying { .. } => "NowPlaying",
            PlayerEvent::QueueFinished { .. } => "QueueFinished",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::SessionStateChanged { .. } => "SessionStateChanged",
            PlayerEvent::PlaybackError { .. } => "PlaybackError",
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            PlayerEvent::NowPlaying { session_id, .. }
            | PlayerEvent::QueueFinished { session_id, .. }
            | PlayerEvent::QueueChanged { session_id, .. }
            | PlayerEvent::VolumeChanged { session_id, .. }
            | PlayerEvent::SessionStateChanged { session_id, .. }
            | PlayerEvent::PlaybackError { session_id, .. } => session_id,
        }
    }
}

/// One-to-many event broadcasting over a tokio broadcast channel.
///
/// Subscribers that lag beyond `capacity` lose the oldest events rather than
/// back-pressuring the engine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscriber is
    /// listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
