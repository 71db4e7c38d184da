//! # Segue Common Library
//!
//! Shared code for the Segue playback-queue service:
//! - Queue data model (sessions, queues, queue items)
//! - Event types (PlayerEvent enum) and the EventBus
//! - Common error type
//! - Display-text utilities (HTML-entity title decoding)

pub mod error;
pub mod events;
pub mod model;
pub mod text;

pub use error::{Error, Result};
pub use model::{MediaRef, Queue, QueueItem, SessionId, DEFAULT_VOLUME};
