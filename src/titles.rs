//! Asynchronous title/metadata resolution.
//!
//! Titles are looked up through an ordered list of public oEmbed-style
//! endpoints; the first strategy that yields a title wins, and only after
//! every strategy fails does the caller fall back to displaying the raw id.
//! Resolution never blocks or fails an enqueue; it runs in a spawned task
//! and its result is applied through [`crate::queue::RequestQueue::apply_title`],
//! which ignores anything that arrives after the entry already resolved.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::queue::{canonical_media_id, MediaSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What a successful lookup yields. The thumbnail matters for the audio
/// source, which has no id-derivable artwork scheme.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedMeta {
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// Ordered lookup endpoints for one media reference.
pub fn lookup_endpoints(source: MediaSource, media_id: &str) -> Vec<String> {
    let watch_url = match source {
        MediaSource::Video => format!("https://www.youtube.com/watch?v={media_id}"),
        MediaSource::Audio => media_id.to_string(),
    };
    let encoded = urlencode(&watch_url);
    match source {
        MediaSource::Video => vec![
            format!("https://www.youtube.com/oembed?format=json&url={encoded}"),
            format!("https://noembed.com/embed?format=json&url={encoded}"),
        ],
        MediaSource::Audio => vec![
            format!("https://soundcloud.com/oembed?format=json&url={encoded}"),
            format!("https://noembed.com/embed?format=json&url={encoded}"),
        ],
    }
}

/// Title + thumbnail from an oEmbed response body, if the title is present
/// and sane.
pub fn parse_meta(body: &str) -> Option<ResolvedMeta> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let title = value.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    let thumbnail_url = value
        .get("thumbnail_url")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(ResolvedMeta {
        title: title.to_string(),
        thumbnail_url,
    })
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Resolver with a per-process cache keyed by canonical media id. A cached
/// `None` means "all strategies failed"; we don't retry within a session.
pub struct TitleResolver {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Option<ResolvedMeta>>>,
}

impl Default for TitleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TitleResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(source: MediaSource, media_id: &str) -> String {
        let canonical = canonical_media_id(source, media_id);
        match source {
            MediaSource::Video => format!("video:{canonical}"),
            MediaSource::Audio => format!("audio:{canonical}"),
        }
    }

    /// Try each endpoint in order; `None` after exhaustion.
    pub async fn resolve(&self, source: MediaSource, media_id: &str) -> Option<ResolvedMeta> {
        let key = Self::cache_key(source, media_id);
        if let Some(cached) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return cached;
        }

        let mut resolved = None;
        for endpoint in lookup_endpoints(source, media_id) {
            match self.fetch_meta(&endpoint).await {
                Some(meta) => {
                    resolved = Some(meta);
                    break;
                }
                None => {
                    tracing::debug!("title lookup miss: {endpoint}");
                }
            }
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, resolved.clone());
        }
        resolved
    }

    async fn fetch_meta(&self, endpoint: &str) -> Option<ResolvedMeta> {
        let response = self.client.get(endpoint).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body = response.text().await.ok()?;
        parse_meta(&body)
    }
}
