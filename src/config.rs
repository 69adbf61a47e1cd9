//! Operator-chosen playback configuration.
//!
//! Loaded once at startup, mutated only through the dock's settings
//! endpoint, persisted on every change, and carried to the other surfaces
//! inside queue snapshots.

use serde::{Deserialize, Serialize};

/// Where the wheel renders during a spin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WheelTarget {
    #[default]
    None,
    Player,
    NowPlaying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Rotate enabled panels forever.
    #[default]
    Always,
    /// Show each enabled panel once, then hide the overlay.
    Once,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    TopLeft,
    TopRight,
    #[default]
    BottomLeft,
    BottomRight,
}

pub const DEFAULT_COMMAND_PREFIX: &str = "sr";
const MIN_PANEL_DURATION_SECS: u32 = 1;
const MAX_PANEL_DURATION_SECS: u32 = 30;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Twitch channel to listen to; empty disables chat ingestion.
    pub channel: String,
    /// Chat command without the leading `!`.
    pub command_prefix: String,
    pub show_video: bool,
    pub autoplay_when_empty: bool,
    pub shuffle_on_end: bool,
    pub wheel_target: WheelTarget,
    pub overlay_position: OverlayPosition,
    pub display_mode: DisplayMode,
    pub show_next: bool,
    pub show_add_message: bool,
    pub panel_duration_secs: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            show_video: false,
            autoplay_when_empty: false,
            shuffle_on_end: false,
            wheel_target: WheelTarget::None,
            overlay_position: OverlayPosition::default(),
            display_mode: DisplayMode::default(),
            show_next: false,
            show_add_message: false,
            panel_duration_secs: 3,
        }
    }
}

impl PlaybackConfig {
    /// Normalize operator input and legacy persisted rows: prefixes keep no
    /// leading `!`, an empty prefix falls back to the default, panel
    /// duration stays within the range the overlay animates sensibly.
    pub fn sanitize(mut self) -> Self {
        self.channel = self.channel.trim().to_string();
        let prefix = self.command_prefix.trim().trim_start_matches('!').to_string();
        self.command_prefix = if prefix.is_empty() {
            DEFAULT_COMMAND_PREFIX.to_string()
        } else {
            prefix
        };
        self.panel_duration_secs = self
            .panel_duration_secs
            .clamp(MIN_PANEL_DURATION_SECS, MAX_PANEL_DURATION_SECS);
        self
    }

    /// The overlay-facing slice of the config, as carried on snapshots.
    pub fn display_settings(&self) -> crate::protocol::DisplaySettings {
        crate::protocol::DisplaySettings {
            display_mode: self.display_mode,
            show_next: self.show_next,
            show_add_message: self.show_add_message,
            panel_duration_secs: self.panel_duration_secs,
            overlay_position: self.overlay_position,
        }
    }
}
