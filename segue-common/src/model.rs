//! Session queue data model
//!
//! A session's playback state is one persisted document: the ordered item
//! list plus the session volume and a store-assigned revision counter. The
//! engine only ever appends items or pops the head; there is no reordering
//! and no random access.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Default session volume in percent, applied to fresh queues and restored
/// when a queue drains.
pub const DEFAULT_VOLUME: u32 = 100;

/// Externally assigned session key (e.g. a guild or room identifier).
///
/// The engine never mints these; callers bring their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A playable URL plus its display title.
///
/// Titles arrive with HTML entities intact; decoding happens at
/// presentation time only (see [`crate::text::decode_title`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub title: String,
}

/// One enqueued playable unit. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Identity of whoever requested this item.
    pub requester: String,
    pub media: MediaRef,
    pub thumbnail_url: Option<String>,
}

/// The persisted per-session queue document.
///
/// `revision` is assigned by the store on every real write; two queues with
/// equal items and volume are the same queue regardless of revision (see
/// [`Queue::same_contents`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub items: Vec<QueueItem>,

    /// Session volume in percent. `None` means the persisted document
    /// predates the field (or stored `null`); playback treats unset and
    /// zero identically (see [`Queue::scale`]).
    pub volume: Option<u32>,

    /// Store-assigned persisted version. Legacy documents without the
    /// field read as 0.
    #[serde(default)]
    pub revision: u64,
}

impl Queue {
    /// Fresh empty queue with the default volume.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            volume: Some(DEFAULT_VOLUME),
            revision: 0,
        }
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: QueueItem) {
        self.items.push(item);
    }

    /// The queue with the head item removed. Volume and revision carry
    /// over unchanged; the store assigns the new revision on write.
    pub fn without_head(&self) -> Self {
        Self {
            items: self.items.iter().skip(1).cloned().collect(),
            volume: self.volume,
            revision: self.revision,
        }
    }

    /// Restore the default volume (used when the queue drains).
    pub fn reset_volume(&mut self) {
        self.volume = Some(DEFAULT_VOLUME);
    }

    /// Structural equality of items and volume. Revision is excluded: it
    /// tracks write history, not contents.
    pub fn same_contents(&self, other: &Queue) -> bool {
        self.items == other.items && self.volume == other.volume
    }

    /// Playback gain for this queue's volume.
    ///
    /// Unset and zero both floor at 1% so a started stream is never fully
    /// muted; other values map percent to linear scale without clamping.
    pub fn scale(&self) -> f32 {
        match self.volume {
            None | Some(0) => 0.01,
            Some(v) => v as f32 / 100.0,
        }
    }

    /// Serialize to the persisted document form.
    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the persisted document form.
    pub fn from_document(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}
