//! Stream transport abstraction
//!
//! The engine does not move audio itself; it drives an external streaming
//! backend through these traits. One session holds at most one
//! [`TransportHandle`] and at most one active [`StreamHandle`] at a time.

use crate::error::Result;
use async_trait::async_trait;
use segue_common::MediaRef;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;

pub mod http;
pub mod sim;

pub use http::HttpMediaResolver;
pub use sim::{SimResolver, SimTransport};

/// Identity and location of the actor requesting playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: String,
    /// Channel the actor currently occupies. `None` means the actor is not
    /// joinable.
    pub channel_id: Option<String>,
}

/// Terminal result of one media stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished,
    Failed(String),
}

/// A resolved media source: the playable URL plus a lazily consumed byte
/// stream. Decoding is the transport's concern.
pub struct MediaSource {
    pub url: String,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// Resolves a media reference into a byte source.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, media: &MediaRef) -> Result<MediaSource>;
}

/// Acquires transport connections.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Join the channel the requesting actor occupies.
    ///
    /// Returns [`crate::Error::NotInChannel`] when the actor has no
    /// joinable channel. Exactly one attempt; retry policy belongs to the
    /// caller.
    async fn join(&self, actor: &ActorContext) -> Result<Box<dyn TransportHandle>>;
}

/// One held connection, session-scoped and exclusive.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Start streaming a source.
    async fn play(&mut self, source: MediaSource) -> Result<Box<dyn StreamHandle>>;

    /// Disconnect from the channel.
    async fn leave(&mut self);
}

/// Control surface of one active stream.
///
/// Dropping the handle releases the underlying stream.
pub trait StreamHandle: Send + Sync {
    /// Apply a linear gain to the stream.
    fn set_volume(&mut self, scale: f32);

    /// Take the single-shot completion channel; yields `Some` exactly
    /// once. The sender side fires when the stream ends, successfully or
    /// not.
    fn take_completion(&mut self) -> Option<oneshot::Receiver<StreamOutcome>>;
}
