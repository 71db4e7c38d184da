//! Simulated transport backend
//!
//! Shared test and demo double for the transport traits. Every join, leave,
//! stream start and volume change is recorded so callers can assert on the
//! exact interaction sequence. Streams never end on their own unless an
//! auto-completion interval is configured; tests drive them explicitly with
//! [`SimTransport::finish_current`] and [`SimTransport::fail_current`].

use crate::error::{Error, Result};
use crate::transport::{
    ActorContext, MediaResolver, MediaSource, StreamHandle, StreamOutcome, TransportHandle,
    TransportProvider,
};
use async_trait::async_trait;
use segue_common::MediaRef;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Default)]
struct SimState {
    joins: Vec<ActorContext>,
    leaves: usize,
    streams: Vec<StreamRecord>,
}

struct StreamRecord {
    url: String,
    volume: Option<f32>,
    completion: Option<oneshot::Sender<StreamOutcome>>,
}

/// In-process transport backend.
#[derive(Clone, Default)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
    auto_complete: Option<Duration>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams report [`StreamOutcome::Finished`] on their own after the
    /// given interval, approximating real media of that length.
    pub fn with_auto_complete(interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            auto_complete: Some(interval),
        }
    }

    pub fn join_count(&self) -> usize {
        self.state.lock().unwrap().joins.len()
    }

    pub fn leave_count(&self) -> usize {
        self.state.lock().unwrap().leaves
    }

    /// URLs of every stream started so far, in start order.
    pub fn started_urls(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.streams.iter().map(|s| s.url.clone()).collect()
    }

    /// Last gain applied to the most recent stream, if any.
    pub fn current_volume(&self) -> Option<f32> {
        let state = self.state.lock().unwrap();
        state.streams.last().and_then(|s| s.volume)
    }

    /// Complete the most recent still-pending stream successfully.
    /// Returns false when no stream is pending.
    pub fn finish_current(&self) -> bool {
        self.complete(StreamOutcome::Finished)
    }

    /// Fail the most recent still-pending stream.
    /// Returns false when no stream is pending.
    pub fn fail_current(&self, message: &str) -> bool {
        self.complete(StreamOutcome::Failed(message.to_string()))
    }

    fn complete(&self, outcome: StreamOutcome) -> bool {
        let mut state = self.state.lock().unwrap();
        for record in state.streams.iter_mut().rev() {
            if let Some(tx) = record.completion.take() {
                // Receiver may already be gone when the session shut down.
                let _ = tx.send(outcome);
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl TransportProvider for SimTransport {
    async fn join(&self, actor: &ActorContext) -> Result<Box<dyn TransportHandle>> {
        if actor.channel_id.is_none() {
            return Err(Error::NotInChannel);
        }
        self.state.lock().unwrap().joins.push(actor.clone());
        Ok(Box::new(SimHandle {
            state: Arc::clone(&self.state),
            auto_complete: self.auto_complete,
        }))
    }
}

struct SimHandle {
    state: Arc<Mutex<SimState>>,
    auto_complete: Option<Duration>,
}

#[async_trait]
impl TransportHandle for SimHandle {
    async fn play(&mut self, source: MediaSource) -> Result<Box<dyn StreamHandle>> {
        let (tx, rx) = oneshot::channel();
        let index = {
            let mut state = self.state.lock().unwrap();
            state.streams.push(StreamRecord {
                url: source.url,
                volume: None,
                completion: Some(tx),
            });
            state.streams.len() - 1
        };
        if let Some(interval) = self.auto_complete {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                tokio::time::sleep(interval).await;
                let sender = state.lock().unwrap().streams[index].completion.take();
                if let Some(tx) = sender {
                    let _ = tx.send(StreamOutcome::Finished);
                }
            });
        }
        Ok(Box::new(SimStream {
            state: Arc::clone(&self.state),
            index,
            completion: Some(rx),
        }))
    }

    async fn leave(&mut self) {
        self.state.lock().unwrap().leaves += 1;
    }
}

struct SimStream {
    state: Arc<Mutex<SimState>>,
    index: usize,
    completion: Option<oneshot::Receiver<StreamOutcome>>,
}

impl StreamHandle for SimStream {
    fn set_volume(&mut self, scale: f32) {
        self.state.lock().unwrap().streams[self.index].volume = Some(scale);
    }

    fn take_completion(&mut self) -> Option<oneshot::Receiver<StreamOutcome>> {
        self.completion.take()
    }
}

/// Resolver that serves a fixed byte payload, or fails on demand.
#[derive(Clone, Default)]
pub struct SimResolver {
    fail: bool,
}

impl SimResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every resolve call fails with a stream error.
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl MediaResolver for SimResolver {
    async fn resolve(&self, media: &MediaRef) -> Result<MediaSource> {
        if self.fail {
            return Err(Error::Stream(format!(
                "Failed to resolve media source: {}",
                media.url
            )));
        }
        Ok(MediaSource {
            url: media.url.clone(),
            reader: Box::new(std::io::Cursor::new(b"simulated audio".to_vec())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor_in_channel() -> ActorContext {
        ActorContext {
            actor_id: "user-1".to_string(),
            channel_id: Some("channel-9".to_string()),
        }
    }

    fn source(url: &str) -> MediaSource {
        MediaSource {
            url: url.to_string(),
            reader: Box::new(std::io::Cursor::new(Vec::new())),
        }
    }

    #[tokio::test]
    async fn test_join_requires_channel() {
        let sim = SimTransport::new();
        let homeless = ActorContext {
            actor_id: "user-2".to_string(),
            channel_id: None,
        };

        let result = sim.join(&homeless).await;
        assert!(matches!(result, Err(Error::NotInChannel)));
        assert_eq!(sim.join_count(), 0);

        assert!(sim.join(&actor_in_channel()).await.is_ok());
        assert_eq!(sim.join_count(), 1);
    }

    #[tokio::test]
    async fn test_play_records_and_finish_delivers_outcome() {
        let sim = SimTransport::new();
        let mut handle = sim.join(&actor_in_channel()).await.unwrap();
        let mut stream = handle.play(source("https://media.test/a")).await.unwrap();
        let completion = stream.take_completion().unwrap();

        assert_eq!(sim.started_urls(), vec!["https://media.test/a"]);
        assert!(sim.finish_current());
        assert_eq!(completion.await.unwrap(), StreamOutcome::Finished);

        // Nothing pending any more.
        assert!(!sim.finish_current());
    }

    #[tokio::test]
    async fn test_fail_current_delivers_message() {
        let sim = SimTransport::new();
        let mut handle = sim.join(&actor_in_channel()).await.unwrap();
        let mut stream = handle.play(source("https://media.test/b")).await.unwrap();
        let completion = stream.take_completion().unwrap();

        assert!(sim.fail_current("decoder blew up"));
        assert_eq!(
            completion.await.unwrap(),
            StreamOutcome::Failed("decoder blew up".to_string())
        );
    }

    #[tokio::test]
    async fn test_volume_and_leave_recorded() {
        let sim = SimTransport::new();
        let mut handle = sim.join(&actor_in_channel()).await.unwrap();
        let mut stream = handle.play(source("https://media.test/c")).await.unwrap();

        assert_eq!(sim.current_volume(), None);
        stream.set_volume(0.4);
        assert_eq!(sim.current_volume(), Some(0.4));

        handle.leave().await;
        assert_eq!(sim.leave_count(), 1);
    }

    #[tokio::test]
    async fn test_auto_complete_fires_after_interval() {
        let sim = SimTransport::with_auto_complete(Duration::from_millis(20));
        let mut handle = sim.join(&actor_in_channel()).await.unwrap();
        let mut stream = handle.play(source("https://media.test/d")).await.unwrap();
        let completion = stream.take_completion().unwrap();

        assert_eq!(completion.await.unwrap(), StreamOutcome::Finished);
    }

    #[tokio::test]
    async fn test_sim_resolver() {
        let media = MediaRef {
            url: "https://media.test/e".to_string(),
            title: "Track".to_string(),
        };
        assert!(SimResolver::new().resolve(&media).await.is_ok());
        assert!(matches!(
            SimResolver::failing().resolve(&media).await,
            Err(Error::Stream(_))
        ));
    }
}
