//! # Segue Player Library (segue-player)
//!
//! Persisted sequential playback-queue engine.
//!
//! **Purpose:** Keep one ordered queue of playable items per session, drive
//! exactly one active stream at a time through a pluggable transport,
//! advance on stream completion, persist every mutation, and surface state
//! changes to a presentation layer (notification sink + SSE event stream).
//!
//! **Architecture:** One actor task per session consuming a command inbox;
//! SQLite document store; axum HTTP/SSE control surface.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
