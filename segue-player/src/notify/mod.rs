//! Presentation notifications
//!
//! The session actor reports user-visible playback milestones through a
//! [`NotificationSink`]. The engine never formats chat output itself; the
//! sink decides how a milestone reaches the audience. The default
//! [`EventBusSink`] republishes milestones as [`PlayerEvent`]s so the SSE
//! layer can render them; [`RecordingSink`] captures them for assertions.

use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use segue_common::events::{EventBus, PlayerEvent};
use segue_common::SessionId;
use std::sync::Mutex;

/// A user-visible playback milestone.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Streaming of an item has started.
    NowPlaying {
        title: String,
        url: String,
        requester: String,
        thumbnail_url: Option<String>,
    },
    /// The queue fully drained.
    QueueFinished,
    /// Playback was requested by an actor with no joinable channel.
    NotInVoiceChannel,
    /// Playback failed and the queue is stalled on its current head.
    PlaybackError { message: String },
}

/// Delivery seam between the engine and the presentation layer.
///
/// Delivery failures are the sink's problem; the actor logs them and moves
/// on, so implementations should not block for long.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, session_id: &SessionId, notification: Notification) -> Result<()>;
}

/// Republishes notifications as [`PlayerEvent`]s on the shared bus.
#[derive(Clone)]
pub struct EventBusSink {
    bus: EventBus,
}

impl EventBusSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl NotificationSink for EventBusSink {
    async fn notify(&self, session_id: &SessionId, notification: Notification) -> Result<()> {
        let event = match notification {
            Notification::NowPlaying {
                title,
                url,
                requester,
                thumbnail_url,
            } => PlayerEvent::NowPlaying {
                session_id: session_id.clone(),
                title,
                url,
                requester,
                thumbnail_url,
                timestamp: Utc::now(),
            },
            Notification::QueueFinished => PlayerEvent::QueueFinished {
                session_id: session_id.clone(),
                timestamp: Utc::now(),
            },
            Notification::NotInVoiceChannel => PlayerEvent::PlaybackError {
                session_id: session_id.clone(),
                message: "Requester is not in a joinable channel".to_string(),
                timestamp: Utc::now(),
            },
            Notification::PlaybackError { message } => PlayerEvent::PlaybackError {
                session_id: session_id.clone(),
                message,
                timestamp: Utc::now(),
            },
        };
        self.bus.emit_lossy(event);
        Ok(())
    }
}

/// Captures every notification for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    notes: Mutex<Vec<(SessionId, Notification)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered for one session, in delivery order.
    pub fn notifications(&self, session_id: &SessionId) -> Vec<Notification> {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .filter(|(sid, _)| sid == session_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<(SessionId, Notification)> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, session_id: &SessionId, notification: Notification) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .push((session_id.clone(), notification));
        Ok(())
    }
}
