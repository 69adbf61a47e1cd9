//! The request queue.
//!
//! Insertion order is play order; index 0 is the playing slot unless the
//! dock has an override active. All mutation rules that the dock exposes to
//! operators (index 0 pinned, duplicate suppression on canonical ids) live
//! here so they hold no matter which entry point mutates the queue.

use serde::{Deserialize, Serialize};

/// Which embed backend plays an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Video,
    Audio,
}

/// Title resolution is asynchronous; "not yet resolved" and "resolution
/// failed, show the id" are different states and both survive persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "state", content = "value")]
pub enum TitleState {
    #[default]
    Pending,
    Resolved(String),
    Failed,
}

/// Placeholder shown when a request has no attributable requester.
pub const NO_REQUESTER: &str = "—";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub source: MediaSource,
    pub media_id: String,
    #[serde(default = "default_requested_by")]
    pub requested_by: String,
    #[serde(default)]
    pub title: TitleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

fn default_requested_by() -> String {
    NO_REQUESTER.to_string()
}

impl QueueItem {
    pub fn new(source: MediaSource, media_id: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            source,
            media_id: media_id.into(),
            requested_by: requested_by.into(),
            title: TitleState::Pending,
            thumbnail_url: None,
        }
    }

    /// Identity key for duplicate suppression.
    pub fn canonical_id(&self) -> String {
        canonical_media_id(self.source, &self.media_id)
    }

    /// Resolved title, falling back to the raw id.
    pub fn display_title(&self) -> &str {
        match &self.title {
            TitleState::Resolved(t) => t,
            _ => &self.media_id,
        }
    }
}

/// Canonical form of a media id: video ids are already opaque tokens; audio
/// ids are permalink URLs whose query/fragment must not create distinct
/// queue identities.
pub fn canonical_media_id(source: MediaSource, media_id: &str) -> String {
    match source {
        MediaSource::Video => media_id.to_string(),
        MediaSource::Audio => {
            let base = media_id.split(['?', '#']).next().unwrap_or(media_id);
            base.trim_end_matches('/').to_string()
        }
    }
}

/// Ordered request queue. Wraps the raw vec so every mutation path applies
/// the same rules.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestQueue {
    items: Vec<QueueItem>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    pub fn second(&self) -> Option<&QueueItem> {
        self.items.get(1)
    }

    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn contains(&self, source: MediaSource, media_id: &str) -> bool {
        let key = canonical_media_id(source, media_id);
        self.items
            .iter()
            .any(|item| item.source == source && item.canonical_id() == key)
    }

    /// Append unless an equivalent item is already queued. Returns whether
    /// the item was added.
    pub fn push(&mut self, item: QueueItem) -> bool {
        if self.contains(item.source, &item.media_id) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Remove by index; out-of-range is a no-op.
    pub fn remove_at(&mut self, index: usize) -> Option<QueueItem> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.items.remove(index))
    }

    /// Remove the first entry matching a canonical identity.
    pub fn remove_matching(&mut self, source: MediaSource, media_id: &str) -> Option<QueueItem> {
        let key = canonical_media_id(source, media_id);
        let pos = self
            .items
            .iter()
            .position(|item| item.source == source && item.canonical_id() == key)?;
        Some(self.items.remove(pos))
    }

    /// Reorder an upcoming item. Index 0 is the playing slot and is pinned
    /// at both ends of the move; equal or out-of-range indices are no-ops.
    /// Returns whether the queue changed.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from == 0 || to == 0 || from == to || from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        true
    }

    /// "Play now": move an upcoming item into the playing slot. Index 0 and
    /// out-of-range are no-ops. Returns whether the queue changed.
    pub fn promote(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.items.len() {
            return false;
        }
        let item = self.items.remove(index);
        self.items.insert(0, item);
        true
    }

    /// Natural completion: drop the playing slot.
    pub fn pop_front(&mut self) -> Option<QueueItem> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items.remove(0))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Entries whose title lookup has not completed (or never ran, e.g.
    /// after a reload from persistence mid-resolution).
    pub fn pending_titles(&self) -> Vec<(MediaSource, String)> {
        self.items
            .iter()
            .filter(|item| item.title == TitleState::Pending)
            .map(|item| (item.source, item.media_id.clone()))
            .collect()
    }

    /// Apply a resolved title (and, when the lookup produced one, a
    /// thumbnail) to the matching entry, but only while the title is still
    /// pending, since a late response must not clobber newer state. Returns
    /// whether anything changed.
    pub fn apply_title(
        &mut self,
        source: MediaSource,
        media_id: &str,
        title: Option<String>,
        thumbnail_url: Option<String>,
    ) -> bool {
        let key = canonical_media_id(source, media_id);
        for item in &mut self.items {
            if item.source == source && item.canonical_id() == key {
                if item.title != TitleState::Pending {
                    return false;
                }
                item.title = match title {
                    Some(t) => TitleState::Resolved(t),
                    None => TitleState::Failed,
                };
                if thumbnail_url.is_some() {
                    item.thumbnail_url = thumbnail_url;
                }
                return true;
            }
        }
        false
    }
}
