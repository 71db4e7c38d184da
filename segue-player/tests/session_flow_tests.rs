//! Session playback flow integration tests
//!
//! Drives session actors end to end against an in-memory database and the
//! simulated transport backend: queue advancement, persistence, volume
//! lifecycle, precondition handling and failure recovery.

use segue_common::events::{EventBus, PlayerEvent, SessionState};
use segue_common::{MediaRef, Queue, QueueItem, SessionId, DEFAULT_VOLUME};
use segue_player::db::init::initialize_database;
use segue_player::db::queue_store::QueueStore;
use segue_player::db::settings::{RetryPolicy, SessionTuning};
use segue_player::notify::{Notification, NotificationSink, RecordingSink};
use segue_player::session::{PlaybackSession, SessionHandle};
use segue_player::transport::{ActorContext, SimResolver, SimTransport};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

// ============================================================================
// Test Infrastructure
// ============================================================================

struct Harness {
    handle: SessionHandle,
    store: QueueStore,
    transport: SimTransport,
    sink: Arc<RecordingSink>,
    bus: EventBus,
    session_id: SessionId,
}

fn fast_tuning() -> SessionTuning {
    SessionTuning {
        advance_settle: Duration::from_millis(10),
        retry: RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        },
    }
}

async fn setup() -> Harness {
    setup_with(SimTransport::new(), SimResolver::new(), fast_tuning()).await
}

async fn setup_with(
    transport: SimTransport,
    resolver: SimResolver,
    tuning: SessionTuning,
) -> Harness {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_database(&pool).await.unwrap();

    let store = QueueStore::new(pool);
    let sink = Arc::new(RecordingSink::new());
    let bus = EventBus::new(64);
    let session_id = SessionId::from("guild-1");

    let handle = PlaybackSession::spawn(
        session_id.clone(),
        store.clone(),
        Arc::new(transport.clone()),
        Arc::new(resolver),
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
        bus.clone(),
        tuning,
    );

    Harness {
        handle,
        store,
        transport,
        sink,
        bus,
        session_id,
    }
}

fn item(n: u32) -> QueueItem {
    QueueItem {
        requester: format!("user-{}", n),
        media: MediaRef {
            url: format!("https://media.test/{}", n),
            title: format!("Track {}", n),
        },
        thumbnail_url: None,
    }
}

fn actor() -> ActorContext {
    ActorContext {
        actor_id: "user-1".to_string(),
        channel_id: Some("channel-9".to_string()),
    }
}

fn homeless_actor() -> ActorContext {
    ActorContext {
        actor_id: "user-2".to_string(),
        channel_id: None,
    }
}

fn urls(queue: &Queue) -> Vec<String> {
    queue.items.iter().map(|i| i.media.url.clone()).collect()
}

async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let waited = timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "Timed out waiting for {}", what);
}

// ============================================================================
// Queue Advancement
// ============================================================================

/// Three items play strictly in enqueue order; the head stays persisted
/// while it streams and is popped only after its stream finishes.
#[tokio::test]
async fn test_enqueue_starts_playback_and_advances_fifo() {
    let h = setup().await;

    let mut first = item(1);
    first.media.title = "Daft Punk &amp; Friends".to_string();
    let q = h.handle.enqueue(first, actor()).await.unwrap();
    assert_eq!(q.len(), 1);
    assert_eq!(q.revision, 1);

    wait_until("first stream to start", || {
        h.transport.started_urls().len() == 1
    })
    .await;

    let q = h.handle.enqueue(item(2), actor()).await.unwrap();
    assert_eq!(q.len(), 2);
    let q = h.handle.enqueue(item(3), actor()).await.unwrap();
    assert_eq!(q.len(), 3);
    assert_eq!(q.revision, 3);

    // Head is retained while streaming
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(
        urls(&stored),
        vec![
            "https://media.test/1",
            "https://media.test/2",
            "https://media.test/3"
        ]
    );

    assert!(h.transport.finish_current());
    wait_until("second stream to start", || {
        h.transport.started_urls().len() == 2
    })
    .await;
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(urls(&stored), vec!["https://media.test/2", "https://media.test/3"]);

    assert!(h.transport.finish_current());
    wait_until("third stream to start", || {
        h.transport.started_urls().len() == 3
    })
    .await;

    assert!(h.transport.finish_current());
    wait_until("queue finished notification", || {
        h.sink
            .notifications(&h.session_id)
            .iter()
            .any(|n| matches!(n, Notification::QueueFinished))
    })
    .await;
    wait_until("transport release", || h.transport.leave_count() == 1).await;

    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert!(stored.is_empty());
    assert_eq!(stored.revision, 6);

    // One join carried all three streams, in order
    assert_eq!(h.transport.join_count(), 1);
    assert_eq!(
        h.transport.started_urls(),
        vec![
            "https://media.test/1",
            "https://media.test/2",
            "https://media.test/3"
        ]
    );

    // NowPlaying announcements follow queue order with entities decoded
    let now_playing: Vec<String> = h
        .sink
        .notifications(&h.session_id)
        .into_iter()
        .filter_map(|n| match n {
            Notification::NowPlaying { title, .. } => Some(title),
            _ => None,
        })
        .collect();
    assert_eq!(
        now_playing,
        vec!["Daft Punk & Friends", "Track 2", "Track 3"]
    );
}

/// Enqueueing while a stream is active appends without restarting playback.
#[tokio::test]
async fn test_enqueue_while_streaming_does_not_restart() {
    let h = setup().await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;

    h.handle.enqueue(item(2), actor()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.transport.started_urls().len(), 1);
    assert_eq!(h.handle.state().await, SessionState::Streaming);
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(stored.len(), 2);
}

/// An enqueue delivered during a finish cycle lands after the pop and is
/// never lost.
#[tokio::test]
async fn test_enqueue_during_advance_is_never_lost() {
    let h = setup_with(
        SimTransport::new(),
        SimResolver::new(),
        SessionTuning {
            advance_settle: Duration::from_millis(150),
            ..fast_tuning()
        },
    )
    .await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("first stream to start", || {
        h.transport.started_urls().len() == 1
    })
    .await;
    h.handle.enqueue(item(2), actor()).await.unwrap();
    h.handle.enqueue(item(3), actor()).await.unwrap();

    // Finish the head and race an enqueue against the settle window
    assert!(h.transport.finish_current());
    let q = h.handle.enqueue(item(4), actor()).await.unwrap();
    assert!(urls(&q).contains(&"https://media.test/4".to_string()));

    wait_until("second stream to start", || {
        h.transport.started_urls().len() == 2
    })
    .await;

    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(
        urls(&stored),
        vec![
            "https://media.test/2",
            "https://media.test/3",
            "https://media.test/4"
        ]
    );
}

/// The settle delay runs between stream finish and the head pop.
#[tokio::test]
async fn test_settle_delay_runs_before_pop() {
    let h = setup_with(
        SimTransport::new(),
        SimResolver::new(),
        SessionTuning {
            advance_settle: Duration::from_millis(300),
            ..fast_tuning()
        },
    )
    .await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;
    h.handle.enqueue(item(2), actor()).await.unwrap();

    assert!(h.transport.finish_current());
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Still inside the settle window: nothing popped, nothing started
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(h.transport.started_urls().len(), 1);

    wait_until("second stream to start", || {
        h.transport.started_urls().len() == 2
    })
    .await;
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(urls(&stored), vec!["https://media.test/2"]);
}

// ============================================================================
// Volume Lifecycle
// ============================================================================

/// A volume change persists immediately but is applied to the stream only
/// at the next advance.
#[tokio::test]
async fn test_volume_applies_at_next_advance() {
    let h = setup().await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    h.handle.enqueue(item(2), actor()).await.unwrap();
    wait_until("first stream to start", || {
        h.transport.started_urls().len() == 1
    })
    .await;
    assert_eq!(h.transport.current_volume(), Some(1.0));

    let q = h.handle.set_volume(40).await.unwrap();
    assert_eq!(q.volume, Some(40));
    // The active stream keeps the gain it started with
    assert_eq!(h.transport.current_volume(), Some(1.0));

    assert!(h.transport.finish_current());
    wait_until("second stream to start", || {
        h.transport.started_urls().len() == 2
    })
    .await;
    assert_eq!(h.transport.current_volume(), Some(0.4));
}

/// Draining the queue resets the persisted volume to the default and
/// releases the transport.
#[tokio::test]
async fn test_drain_resets_volume_and_releases_transport() {
    let h = setup().await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;

    let q = h.handle.set_volume(40).await.unwrap();
    assert_eq!(q.volume, Some(40));

    assert!(h.transport.finish_current());
    wait_until("queue finished notification", || {
        h.sink
            .notifications(&h.session_id)
            .iter()
            .any(|n| matches!(n, Notification::QueueFinished))
    })
    .await;
    wait_until("transport release", || h.transport.leave_count() == 1).await;

    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert!(stored.is_empty());
    assert_eq!(stored.volume, Some(DEFAULT_VOLUME));
    assert_eq!(h.handle.state().await, SessionState::Idle);
}

// ============================================================================
// Preconditions and Failures
// ============================================================================

/// An enqueue from an actor without a joinable channel persists the item
/// but never joins or streams; the precondition is reported through the
/// sink. A later kick from a joinable actor plays the retained queue.
#[tokio::test]
async fn test_join_precondition_blocks_playback_but_keeps_queue() {
    let h = setup().await;

    let q = h.handle.enqueue(item(1), homeless_actor()).await.unwrap();
    assert_eq!(q.len(), 1);

    wait_until("precondition notification", || {
        h.sink
            .notifications(&h.session_id)
            .iter()
            .any(|n| matches!(n, Notification::NotInVoiceChannel))
    })
    .await;

    assert_eq!(h.transport.join_count(), 0);
    assert!(h.transport.started_urls().is_empty());
    assert_eq!(h.handle.state().await, SessionState::Idle);
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(stored.len(), 1);

    // Recovery: a joinable actor kicks the retained head
    h.handle.start(actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;
    assert_eq!(h.transport.join_count(), 1);
}

/// A stream error stalls the session: no advance, transport kept. The next
/// kick replays the same head.
#[tokio::test]
async fn test_stream_error_stalls_without_advancing() {
    let h = setup().await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    h.handle.enqueue(item(2), actor()).await.unwrap();
    wait_until("first stream to start", || {
        h.transport.started_urls().len() == 1
    })
    .await;

    assert!(h.transport.fail_current("decoder blew up"));
    wait_until("playback error notification", || {
        h.sink.notifications(&h.session_id).iter().any(
            |n| matches!(n, Notification::PlaybackError { message } if message == "decoder blew up"),
        )
    })
    .await;

    // Stalled, not advanced: head intact, transport still connected
    assert_eq!(h.handle.state().await, SessionState::Idle);
    assert_eq!(h.transport.leave_count(), 0);
    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(
        urls(&stored),
        vec!["https://media.test/1", "https://media.test/2"]
    );

    // Manual recovery replays the same head on the held transport
    h.handle.start(actor()).await.unwrap();
    wait_until("head replay", || h.transport.started_urls().len() == 2).await;
    assert_eq!(
        h.transport.started_urls(),
        vec!["https://media.test/1", "https://media.test/1"]
    );
    assert_eq!(h.transport.join_count(), 1);
}

/// A persistent store failure surfaces as a playback error; it is never
/// treated as an empty queue, so no drain side effects fire.
#[tokio::test]
async fn test_store_failure_is_not_an_empty_queue() {
    let h = setup().await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;

    // Every store call from here on fails
    h.store.pool().close().await;

    assert!(h.transport.finish_current());
    wait_until("playback error notification", || {
        h.sink
            .notifications(&h.session_id)
            .iter()
            .any(|n| matches!(n, Notification::PlaybackError { .. }))
    })
    .await;

    let notes = h.sink.notifications(&h.session_id);
    assert!(
        !notes.iter().any(|n| matches!(n, Notification::QueueFinished)),
        "a failed read must not drain the queue"
    );
    assert_eq!(h.transport.leave_count(), 0);
    assert_eq!(h.handle.state().await, SessionState::Idle);
}

/// Kicking an empty queue reports queue-finished without touching the
/// transport.
#[tokio::test]
async fn test_start_on_empty_queue_reports_finished() {
    let h = setup().await;

    h.handle.start(actor()).await.unwrap();
    wait_until("queue finished notification", || {
        h.sink
            .notifications(&h.session_id)
            .iter()
            .any(|n| matches!(n, Notification::QueueFinished))
    })
    .await;

    assert_eq!(h.transport.join_count(), 0);
    assert_eq!(h.transport.leave_count(), 0);
    assert!(h
        .sink
        .notifications(&h.session_id)
        .iter()
        .all(|n| !matches!(n, Notification::NowPlaying { .. })));
}

// ============================================================================
// Shutdown and Events
// ============================================================================

/// Shutdown drops the active stream, leaves the channel and stops the
/// actor without popping the head.
#[tokio::test]
async fn test_shutdown_releases_transport_and_keeps_queue() {
    let h = setup().await;

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;

    h.handle.shutdown();
    wait_until("transport release", || h.transport.leave_count() == 1).await;
    wait_until("actor to stop", || h.handle.is_closed()).await;

    let stored = h.store.get_queue(&h.session_id).await.unwrap();
    assert_eq!(stored.len(), 1);
}

/// The broadcast bus carries the queue and state bookkeeping for a full
/// single-item lifecycle in a deterministic order.
#[tokio::test]
async fn test_bus_events_trace_lifecycle() {
    let h = setup().await;
    let mut rx = h.bus.subscribe();

    h.handle.enqueue(item(1), actor()).await.unwrap();
    wait_until("stream to start", || h.transport.started_urls().len() == 1).await;
    assert!(h.transport.finish_current());
    wait_until("transport release", || h.transport.leave_count() == 1).await;

    let mut events = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(200), rx.recv()).await {
        let done = matches!(
            event,
            PlayerEvent::SessionStateChanged {
                state: SessionState::Idle,
                ..
            }
        );
        events.push(event);
        if done {
            break;
        }
    }

    let labels: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        labels,
        vec![
            "QueueChanged",        // enqueue persisted
            "SessionStateChanged", // acquiring transport
            "SessionStateChanged", // streaming
            "QueueChanged",        // head popped
            "SessionStateChanged", // idle after drain
        ]
    );

    match &events[0] {
        PlayerEvent::QueueChanged { len, revision, .. } => {
            assert_eq!(*len, 1);
            assert_eq!(*revision, 1);
        }
        other => panic!("Unexpected event: {}", other.event_type()),
    }
    match &events[3] {
        PlayerEvent::QueueChanged { len, revision, .. } => {
            assert_eq!(*len, 0);
            assert_eq!(*revision, 2);
        }
        other => panic!("Unexpected event: {}", other.event_type()),
    }
}
