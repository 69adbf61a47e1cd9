//! Bus message schema.
//!
//! Every surface (dock/engine, player, now-playing overlay) speaks this one
//! tagged JSON protocol over the broadcast topic. The enum is closed:
//! frames with an unknown tag or missing fields fail to decode and are
//! dropped at the boundary, so a misbehaving peer can never crash a
//! listener.

use serde::{Deserialize, Serialize};

use crate::config::WheelTarget;
use crate::queue::MediaSource;

/// Which surface a hello/heartbeat originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SurfaceKind {
    Dock,
    Player,
    NowPlaying,
}

/// One queue entry as broadcast to peers. Title is `None` until resolution
/// finishes (or when it failed); consumers fall back to the media id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntryView {
    pub source: MediaSource,
    pub media_id: String,
    pub title: Option<String>,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Overlay display settings carried on every queue snapshot so the passive
/// overlay never needs its own config store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub display_mode: crate::config::DisplayMode,
    pub show_next: bool,
    pub show_add_message: bool,
    pub panel_duration_secs: u32,
    pub overlay_position: crate::config::OverlayPosition,
}

/// One wheel segment: enough for any surface to render a labelled slice and
/// for the dock to map the winner back to a queue entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelSegment {
    pub source: MediaSource,
    pub media_id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusMessage {
    // --- surface -> dock ---------------------------------------------------
    Hello {
        surface: SurfaceKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<uuid::Uuid>,
    },
    Ping {
        surface: SurfaceKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<uuid::Uuid>,
    },
    /// Overlay asking for a fresh pair of snapshots (late join / reload).
    StateRequest,
    Progress {
        current: f64,
        duration: f64,
    },
    Ended,

    // --- dock -> all -------------------------------------------------------
    QueueSnapshot {
        queue: Vec<QueueEntryView>,
        command_prefix: String,
        display: DisplaySettings,
    },
    NowPlayingSnapshot {
        /// `None` when nothing is playing or queued.
        item: Option<QueueEntryView>,
        current: f64,
        duration: f64,
    },

    // --- dock -> player ----------------------------------------------------
    LoadMedia {
        source: MediaSource,
        media_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumbnail_url: Option<String>,
    },
    Play,
    Pause,
    Seek {
        seconds: f64,
    },
    SetVolume {
        percent: u8,
    },
    Clear,
    SetVisible {
        visible: bool,
    },

    // --- dock -> wheel renderer(s) ------------------------------------------
    /// Idle wheel shown on the target surface while no spin is in flight.
    SpinPreview {
        segments: Vec<WheelSegment>,
        target: WheelTarget,
    },
    SpinStart {
        segments: Vec<WheelSegment>,
        winner_index: usize,
        /// Final rotation in degrees; every renderer eases to the same angle
        /// so independently-rendered animations agree on the winner.
        stop_angle: f64,
        #[serde(default)]
        start_delay_ms: u64,
        target: WheelTarget,
    },
    SpinEnd {
        target: WheelTarget,
    },
}

impl BusMessage {
    /// Decode one wire frame. Unknown tags, missing fields, or non-JSON
    /// input all come back as `None`.
    pub fn decode(raw: &str) -> Option<BusMessage> {
        serde_json::from_str(raw).ok()
    }

    pub fn encode(&self) -> String {
        // The enum contains nothing unserializable.
        serde_json::to_string(self).unwrap_or_default()
    }
}
