//! Session registry
//!
//! Lazily spawns one [`PlaybackSession`] actor per session id and hands out
//! clones of its [`SessionHandle`]. A session whose actor has stopped is
//! respawned on next access; its queue is whatever the store last persisted,
//! so playback picks up where it left off.

use crate::db::queue_store::QueueStore;
use crate::db::settings::{load_session_tuning, SessionTuning};
use crate::notify::NotificationSink;
use crate::session::{PlaybackSession, SessionHandle};
use crate::transport::{MediaResolver, TransportProvider};
use segue_common::events::EventBus;
use segue_common::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    store: QueueStore,
    transport: Arc<dyn TransportProvider>,
    resolver: Arc<dyn MediaResolver>,
    sink: Arc<dyn NotificationSink>,
    bus: EventBus,
}

impl SessionRegistry {
    pub fn new(
        store: QueueStore,
        transport: Arc<dyn TransportProvider>,
        resolver: Arc<dyn MediaResolver>,
        sink: Arc<dyn NotificationSink>,
        bus: EventBus,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            transport,
            resolver,
            sink,
            bus,
        }
    }

    /// Handle for `session_id`, spawning the actor on first access or after
    /// a previous actor stopped.
    pub async fn session(&self, session_id: &SessionId) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(session_id) {
                if !handle.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another caller may have spawned while we waited for the lock.
        if let Some(handle) = sessions.get(session_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        let tuning = match load_session_tuning(self.store.pool()).await {
            Ok(tuning) => tuning,
            Err(e) => {
                warn!("Failed to load session tuning, using defaults: {}", e);
                SessionTuning::default()
            }
        };
        info!("Spawning playback session {}", session_id);
        let handle = PlaybackSession::spawn(
            session_id.clone(),
            self.store.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.resolver),
            Arc::clone(&self.sink),
            self.bus.clone(),
            tuning,
        );
        sessions.insert(session_id.clone(), handle.clone());
        handle
    }

    /// Live handle for `session_id` without spawning anything.
    pub async fn peek(&self, session_id: &SessionId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Ask every live actor to stop. Used on server shutdown so transports
    /// are released before the process exits.
    pub async fn shutdown_all(&self) {
        let sessions = self.sessions.read().await;
        for (session_id, handle) in sessions.iter() {
            debug!("Shutting down session {}", session_id);
            handle.shutdown();
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }
}
