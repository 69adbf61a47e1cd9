//! Chat request parsing.
//!
//! The chat-ingestion component is an external collaborator: given a
//! channel, it invokes `onCommand(user, command, text)` for every prefixed
//! chat command. In this deployment that callback lands on
//! `POST /api/v1/chat/command`; this module owns what happens next:
//! matching the configured prefix and extracting a playable reference from
//! the message text.

use crate::queue::{canonical_media_id, MediaSource};

/// A parsed, playable chat request.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaRef {
    pub source: MediaSource,
    pub media_id: String,
}

/// Commands match the configured prefix exactly (the ingestion layer has
/// already stripped the leading `!`).
pub fn matches_prefix(command: &str, prefix: &str) -> bool {
    command == prefix
}

/// Extract a media reference from free-form message text. Video links in
/// the usual shapes yield the 11-character id; audio permalinks yield the
/// canonicalized URL. Returns `None` when nothing playable is found.
pub fn parse_media_ref(text: &str) -> Option<MediaRef> {
    for token in text.split_whitespace() {
        if let Some(id) = extract_video_id(token) {
            return Some(MediaRef {
                source: MediaSource::Video,
                media_id: id,
            });
        }
        if let Some(url) = extract_audio_url(token) {
            return Some(MediaRef {
                source: MediaSource::Audio,
                media_id: url,
            });
        }
    }
    None
}

fn is_video_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// The 11-character id from watch/short-link/shorts URL shapes.
fn extract_video_id(token: &str) -> Option<String> {
    let rest = token.strip_prefix("https://").or_else(|| token.strip_prefix("http://")).unwrap_or(token);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let candidate = if let Some(after) = rest.strip_prefix("youtu.be/") {
        Some(after)
    } else if let Some(after) = rest
        .strip_prefix("youtube.com/")
        .or_else(|| rest.strip_prefix("music.youtube.com/"))
    {
        if let Some(shorts) = after.strip_prefix("shorts/") {
            Some(shorts)
        } else if after.starts_with("watch?") {
            // Find the v= query parameter.
            after
                .split_once('?')
                .map(|(_, query)| query)
                .and_then(|query| {
                    query
                        .split('&')
                        .find_map(|pair| pair.strip_prefix("v="))
                })
        } else {
            None
        }
    } else {
        None
    }?;

    let id: String = candidate.chars().take_while(|c| is_video_id_char(*c)).collect();
    if id.len() == 11 {
        Some(id)
    } else {
        None
    }
}

/// Audio permalinks are kept whole (the embed loads by URL), canonicalized
/// so query/fragment variants share one queue identity.
fn extract_audio_url(token: &str) -> Option<String> {
    let rest = token.strip_prefix("https://").or_else(|| token.strip_prefix("http://"))?;
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let path = rest.strip_prefix("soundcloud.com/")?;
    // Require at least artist/track; a bare profile link is not playable.
    let bare = path.split(['?', '#']).next().unwrap_or("");
    if bare.trim_end_matches('/').split('/').filter(|s| !s.is_empty()).count() < 2 {
        return None;
    }
    Some(canonical_media_id(
        MediaSource::Audio,
        &format!("https://soundcloud.com/{path}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url_yields_the_video_id() {
        let r = parse_media_ref("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(r.source, MediaSource::Video);
        assert_eq!(r.media_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn short_link_and_shorts_work() {
        assert_eq!(
            parse_media_ref("check this https://youtu.be/dQw4w9WgXcQ out").unwrap().media_id,
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            parse_media_ref("https://youtube.com/shorts/dQw4w9WgXcQ?feature=share")
                .unwrap()
                .media_id,
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn watch_url_with_extra_params_still_parses() {
        let r = parse_media_ref("https://youtube.com/watch?list=PL123&v=dQw4w9WgXcQ&t=42").unwrap();
        assert_eq!(r.media_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn audio_permalink_is_canonicalized() {
        let r = parse_media_ref("https://soundcloud.com/artist/track?si=xyz#t=1").unwrap();
        assert_eq!(r.source, MediaSource::Audio);
        assert_eq!(r.media_id, "https://soundcloud.com/artist/track");
    }

    #[test]
    fn bare_profile_links_are_not_playable() {
        assert_eq!(parse_media_ref("https://soundcloud.com/artist"), None);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert_eq!(parse_media_ref("play something good"), None);
        assert_eq!(parse_media_ref("https://youtu.be/short"), None);
        assert_eq!(parse_media_ref(""), None);
    }

    #[test]
    fn prefix_match_is_exact() {
        assert!(matches_prefix("sr", "sr"));
        assert!(!matches_prefix("srx", "sr"));
        assert!(!matches_prefix("SR", "sr"));
    }
}
