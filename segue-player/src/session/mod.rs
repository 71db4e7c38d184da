//! Playback session actor
//!
//! One [`PlaybackSession`] task owns everything mutable about a session: the
//! held transport, the active stream and the actor-local state machine.
//! Callers talk to it through a cloneable [`SessionHandle`]; commands are
//! processed strictly in arrival order, so there is never a race between an
//! enqueue, a volume change and an auto-advance.
//!
//! The queue itself lives in the store, not in the actor. Every mutation is
//! read-modify-write through [`QueueStore`], and the value the store hands
//! back is the value the actor acts on next.

use crate::db::queue_store::QueueStore;
use crate::db::settings::{RetryPolicy, SessionTuning};
use crate::error::{Error, Result};
use crate::notify::{Notification, NotificationSink};
use crate::transport::{
    ActorContext, MediaResolver, StreamHandle, StreamOutcome, TransportHandle, TransportProvider,
};
use chrono::Utc;
use segue_common::events::{EventBus, PlayerEvent, SessionState};
use segue_common::text::decode_title;
use segue_common::{Queue, QueueItem, SessionId, DEFAULT_VOLUME};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

pub mod registry;

/// Commands accepted by the session actor.
pub enum SessionCommand {
    /// Append an item to the queue. Starts playback when the session is
    /// idle, using the enqueuing actor's channel.
    Enqueue {
        item: QueueItem,
        actor: ActorContext,
        reply: oneshot::Sender<Result<Queue>>,
    },
    /// Kick playback of the current head if the session is idle. Also the
    /// manual recovery path after a stream error.
    Start {
        actor: ActorContext,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Persist a new session volume. Takes effect from the next advance;
    /// the active stream keeps the gain it started with.
    SetVolume {
        percent: u32,
        reply: oneshot::Sender<Result<Queue>>,
    },
    /// Stop the actor, dropping any active stream and leaving the channel.
    Shutdown,
}

/// State observable without going through the inbox.
struct SessionShared {
    state: RwLock<SessionState>,
}

/// What woke the actor loop.
enum Step {
    Command(Option<SessionCommand>),
    StreamEnded(StreamOutcome),
}

pub struct PlaybackSession {
    session_id: SessionId,
    store: QueueStore,
    transport: Arc<dyn TransportProvider>,
    resolver: Arc<dyn MediaResolver>,
    sink: Arc<dyn NotificationSink>,
    bus: EventBus,
    tuning: SessionTuning,
    inbox: mpsc::UnboundedReceiver<SessionCommand>,
    state: SessionState,
    shared: Arc<SessionShared>,
    /// Transport connection, held from first successful join until the
    /// queue drains or the actor stops.
    held: Option<Box<dyn TransportHandle>>,
    stream: Option<Box<dyn StreamHandle>>,
    completion: Option<oneshot::Receiver<StreamOutcome>>,
}

impl PlaybackSession {
    /// Spawn the actor task and return its handle.
    pub fn spawn(
        session_id: SessionId,
        store: QueueStore,
        transport: Arc<dyn TransportProvider>,
        resolver: Arc<dyn MediaResolver>,
        sink: Arc<dyn NotificationSink>,
        bus: EventBus,
        tuning: SessionTuning,
    ) -> SessionHandle {
        let (tx, inbox) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared {
            state: RwLock::new(SessionState::Idle),
        });
        let session = PlaybackSession {
            session_id,
            store,
            transport,
            resolver,
            sink,
            bus,
            tuning,
            inbox,
            state: SessionState::Idle,
            shared: Arc::clone(&shared),
            held: None,
            stream: None,
            completion: None,
        };
        tokio::spawn(session.run());
        SessionHandle { tx, shared }
    }

    async fn run(mut self) {
        info!("Playback session {} started", self.session_id);
        loop {
            let step = match self.completion.as_mut() {
                Some(completion) => tokio::select! {
                    cmd = self.inbox.recv() => Step::Command(cmd),
                    outcome = completion => Step::StreamEnded(outcome.unwrap_or_else(|_| {
                        StreamOutcome::Failed("Stream ended without reporting an outcome".to_string())
                    })),
                },
                None => Step::Command(self.inbox.recv().await),
            };

            match step {
                Step::Command(Some(cmd)) => {
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
                // Every handle dropped: nothing can reach this session.
                Step::Command(None) => break,
                Step::StreamEnded(outcome) => {
                    self.completion = None;
                    self.handle_stream_end(outcome).await;
                }
            }
        }
        self.release_transport().await;
        info!("Playback session {} stopped", self.session_id);
    }

    /// Returns false when the actor should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Enqueue { item, actor, reply } => {
                let current = match self.fetch_queue().await {
                    Ok(queue) => queue,
                    Err(e) => {
                        error!("Session {} failed to load queue for enqueue: {}", self.session_id, e);
                        let _ = reply.send(Err(e));
                        return true;
                    }
                };
                let mut next = current.clone();
                next.push(item);
                let written = match self.persist_queue(&next).await {
                    Ok(queue) => queue,
                    Err(e) => {
                        error!("Session {} failed to persist enqueue: {}", self.session_id, e);
                        let _ = reply.send(Err(e));
                        return true;
                    }
                };
                if written.revision != current.revision {
                    self.emit_queue_changed(&written);
                }
                let _ = reply.send(Ok(written.clone()));
                if self.state == SessionState::Idle {
                    self.start_or_resume(written, Some(&actor)).await;
                }
                true
            }

            SessionCommand::Start { actor, reply } => {
                if self.state != SessionState::Idle {
                    debug!("Session {} already streaming, start ignored", self.session_id);
                    let _ = reply.send(Ok(()));
                    return true;
                }
                // The caller only learns the kick was accepted; failures
                // surface through the notification sink.
                let _ = reply.send(Ok(()));
                match self.fetch_queue().await {
                    Ok(queue) => self.start_or_resume(queue, Some(&actor)).await,
                    Err(e) => {
                        error!("Session {} failed to load queue for start: {}", self.session_id, e);
                        self.deliver(Notification::PlaybackError {
                            message: format!("Failed to load queue: {}", e),
                        })
                        .await;
                    }
                }
                true
            }

            SessionCommand::SetVolume { percent, reply } => {
                let current = match self.fetch_queue().await {
                    Ok(queue) => queue,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return true;
                    }
                };
                let mut next = current.clone();
                next.volume = Some(percent);
                match self.persist_queue(&next).await {
                    Ok(written) => {
                        if written.revision != current.revision {
                            self.bus.emit_lossy(PlayerEvent::VolumeChanged {
                                session_id: self.session_id.clone(),
                                volume: percent,
                                timestamp: Utc::now(),
                            });
                        }
                        let _ = reply.send(Ok(written));
                    }
                    Err(e) => {
                        error!("Session {} failed to persist volume: {}", self.session_id, e);
                        let _ = reply.send(Err(e));
                    }
                }
                true
            }

            SessionCommand::Shutdown => {
                debug!("Session {} shutting down", self.session_id);
                self.stream = None;
                self.completion = None;
                self.release_transport().await;
                self.set_state(SessionState::Idle).await;
                false
            }
        }
    }

    async fn handle_stream_end(&mut self, outcome: StreamOutcome) {
        self.stream = None;
        match outcome {
            StreamOutcome::Finished => self.advance().await,
            StreamOutcome::Failed(message) => self.stall(message).await,
        }
    }

    /// Finish path: settle, pop the head, persist, then re-enter
    /// [`Self::start_or_resume`] with the value the store returned.
    async fn advance(&mut self) {
        tokio::time::sleep(self.tuning.advance_settle).await;

        let queue = match self.fetch_queue().await {
            Ok(queue) => queue,
            Err(e) => {
                // A failed read is never an empty queue. Stall instead of
                // draining a session we cannot see.
                error!("Session {} failed to load queue for advance: {}", self.session_id, e);
                self.deliver(Notification::PlaybackError {
                    message: format!("Failed to load queue: {}", e),
                })
                .await;
                self.set_state(SessionState::Idle).await;
                return;
            }
        };

        let next = queue.without_head();
        let written = match self.persist_queue(&next).await {
            Ok(queue) => queue,
            Err(e) => {
                // Head stays in place; it replays on the next kick.
                error!("Session {} failed to persist advance: {}", self.session_id, e);
                self.deliver(Notification::PlaybackError {
                    message: format!("Failed to persist queue: {}", e),
                })
                .await;
                self.set_state(SessionState::Idle).await;
                return;
            }
        };
        if written.revision != queue.revision {
            self.emit_queue_changed(&written);
        }
        self.start_or_resume(written, None).await;
    }

    /// Error path: keep the transport and the persisted head, go idle.
    async fn stall(&mut self, message: String) {
        error!("Session {} stream failed: {}", self.session_id, message);
        self.deliver(Notification::PlaybackError { message }).await;
        self.set_state(SessionState::Idle).await;
    }

    /// Drive the head of `queue` onto the transport, or finish the session
    /// when the queue is empty.
    ///
    /// `actor` locates the channel to join when no transport is held;
    /// auto-advance passes `None` and relies on the held connection.
    async fn start_or_resume(&mut self, queue: Queue, actor: Option<&ActorContext>) {
        let head = match queue.head().cloned() {
            Some(item) => item,
            None => {
                self.finish_queue(queue).await;
                return;
            }
        };

        if self.held.is_none() {
            let Some(actor) = actor else {
                warn!("Session {} has no transport and no requesting actor", self.session_id);
                self.deliver(Notification::NotInVoiceChannel).await;
                self.set_state(SessionState::Idle).await;
                return;
            };
            self.set_state(SessionState::AcquiringTransport).await;
            // One join attempt per call, no retry.
            match self.transport.join(actor).await {
                Ok(handle) => self.held = Some(handle),
                Err(Error::NotInChannel) => {
                    info!(
                        "Session {}: actor {} is not in a joinable channel",
                        self.session_id, actor.actor_id
                    );
                    self.deliver(Notification::NotInVoiceChannel).await;
                    self.set_state(SessionState::Idle).await;
                    return;
                }
                Err(e) => {
                    error!("Session {} failed to join channel: {}", self.session_id, e);
                    self.deliver(Notification::PlaybackError {
                        message: format!("Failed to join channel: {}", e),
                    })
                    .await;
                    self.set_state(SessionState::Idle).await;
                    return;
                }
            }
        }

        let source = match self.resolver.resolve(&head.media).await {
            Ok(source) => source,
            Err(e) => {
                error!(
                    "Session {} failed to resolve {}: {}",
                    self.session_id, head.media.url, e
                );
                self.deliver(Notification::PlaybackError {
                    message: format!("Failed to start stream: {}", e),
                })
                .await;
                self.set_state(SessionState::Idle).await;
                return;
            }
        };

        let started = match self.held.as_mut() {
            Some(transport) => transport.play(source).await,
            None => Err(Error::Transport("Transport lost before play".to_string())),
        };
        let mut stream = match started {
            Ok(stream) => stream,
            Err(e) => {
                error!(
                    "Session {} failed to start stream for {}: {}",
                    self.session_id, head.media.url, e
                );
                self.deliver(Notification::PlaybackError {
                    message: format!("Failed to start stream: {}", e),
                })
                .await;
                self.set_state(SessionState::Idle).await;
                return;
            }
        };

        info!(
            "Session {} now playing {} (requested by {})",
            self.session_id, head.media.url, head.requester
        );
        self.deliver(Notification::NowPlaying {
            title: decode_title(&head.media.title),
            url: head.media.url.clone(),
            requester: head.requester.clone(),
            thumbnail_url: head.thumbnail_url.clone(),
        })
        .await;

        // Volume captured from the queue value current at this call; later
        // changes wait for the next advance.
        stream.set_volume(queue.scale());

        match stream.take_completion() {
            Some(completion) => {
                self.completion = Some(completion);
                self.stream = Some(stream);
                self.set_state(SessionState::Streaming).await;
            }
            None => {
                error!(
                    "Session {}: stream for {} exposed no completion channel",
                    self.session_id, head.media.url
                );
                self.deliver(Notification::PlaybackError {
                    message: "Stream exposed no completion signal".to_string(),
                })
                .await;
                self.set_state(SessionState::Idle).await;
            }
        }
    }

    /// Drain path: notify, restore the default volume, release the
    /// transport. Leave is attempted whenever a transport is held, even if
    /// the volume reset failed to persist.
    async fn finish_queue(&mut self, queue: Queue) {
        info!("Session {} queue finished", self.session_id);
        self.deliver(Notification::QueueFinished).await;

        let mut reset = queue.clone();
        reset.reset_volume();
        match self.persist_queue(&reset).await {
            Ok(written) => {
                if written.revision != queue.revision {
                    self.bus.emit_lossy(PlayerEvent::VolumeChanged {
                        session_id: self.session_id.clone(),
                        volume: DEFAULT_VOLUME,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => {
                error!(
                    "Session {} failed to reset volume after drain: {}",
                    self.session_id, e
                );
                self.deliver(Notification::PlaybackError {
                    message: format!("Failed to reset volume: {}", e),
                })
                .await;
            }
        }

        self.release_transport().await;
        self.set_state(SessionState::Idle).await;
    }

    async fn release_transport(&mut self) {
        if let Some(mut held) = self.held.take() {
            debug!("Session {} leaving channel", self.session_id);
            held.leave().await;
        }
    }

    async fn fetch_queue(&self) -> Result<Queue> {
        let store = &self.store;
        let session_id = &self.session_id;
        with_retry(&self.tuning.retry, "load queue", || {
            store.get_queue(session_id)
        })
        .await
    }

    async fn persist_queue(&self, queue: &Queue) -> Result<Queue> {
        let store = &self.store;
        let session_id = &self.session_id;
        with_retry(&self.tuning.retry, "persist queue", || {
            store.update_queue(session_id, queue)
        })
        .await
    }

    async fn deliver(&self, notification: Notification) {
        if let Err(e) = self.sink.notify(&self.session_id, notification).await {
            warn!("Session {} notification delivery failed: {}", self.session_id, e);
        }
    }

    fn emit_queue_changed(&self, queue: &Queue) {
        self.bus.emit_lossy(PlayerEvent::QueueChanged {
            session_id: self.session_id.clone(),
            len: queue.len(),
            revision: queue.revision,
            timestamp: Utc::now(),
        });
    }

    async fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        debug!("Session {} state {} -> {}", self.session_id, self.state, next);
        self.state = next;
        *self.shared.state.write().await = next;
        self.bus.emit_lossy(PlayerEvent::SessionStateChanged {
            session_id: self.session_id.clone(),
            state: next,
            timestamp: Utc::now(),
        });
    }
}

/// Retry transient failures of a store operation, waiting `policy.backoff`
/// between attempts. Permanent errors return immediately.
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                warn!(
                    "Attempt {}/{} to {} failed: {}",
                    attempt, policy.attempts, what, e
                );
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Cloneable front door to one session actor.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// Append an item; returns the queue value the store persisted.
    pub async fn enqueue(&self, item: QueueItem, actor: ActorContext) -> Result<Queue> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Enqueue { item, actor, reply })
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Kick playback of the current head.
    pub async fn start(&self, actor: ActorContext) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Start { actor, reply })
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Persist a new volume; applies from the next advance.
    pub async fn set_volume(&self, percent: u32) -> Result<Queue> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::SetVolume { percent, reply })
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Ask the actor to stop. Best effort; an already-stopped actor is fine.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown);
    }

    pub async fn state(&self) -> SessionState {
        *self.shared.state.read().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn stopped() -> Error {
    Error::Session("Session actor stopped".to_string())
}
