//! Player-surface command execution.
//!
//! The player surface holds one media backend per source (the video embed
//! and the audio embed are third-party players behind [`MediaBackend`]) and
//! translates bus commands into backend calls. The executor is agnostic to
//! which backend is active; `LOAD_MEDIA` switches it.

use crate::protocol::BusMessage;
use crate::queue::MediaSource;

/// Uniform control interface over a playable embed. Implementations wrap
/// the source-specific player APIs; `ended` is delivered out-of-band by the
/// host surface (the embeds push it via their own event callbacks).
pub trait MediaBackend {
    fn load_by_id(&mut self, media_id: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, seconds: f64);
    /// Both embeds take 0–100.
    fn set_volume(&mut self, percent: u8);
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
}

/// Translates dock commands into calls on the active backend.
pub struct CommandExecutor<V, A> {
    video: V,
    audio: A,
    active: Option<MediaSource>,
    visible: bool,
}

impl<V: MediaBackend, A: MediaBackend> CommandExecutor<V, A> {
    pub fn new(video: V, audio: A) -> Self {
        Self {
            video,
            audio,
            active: None,
            visible: false,
        }
    }

    pub fn active_source(&self) -> Option<MediaSource> {
        self.active
    }

    /// Whether the video area should be rendered. Advisory; the dock
    /// recomputes it and pushes `SET_VISIBLE` as state changes.
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Current playback position of the active backend, for progress
    /// reporting. `(0, 0)` while nothing is loaded.
    pub fn progress(&self) -> (f64, f64) {
        match self.active {
            Some(MediaSource::Video) => (self.video.current_time(), self.video.duration()),
            Some(MediaSource::Audio) => (self.audio.current_time(), self.audio.duration()),
            None => (0.0, 0.0),
        }
    }

    fn active_backend(&mut self) -> Option<&mut dyn MediaBackend> {
        match self.active? {
            MediaSource::Video => Some(&mut self.video),
            MediaSource::Audio => Some(&mut self.audio),
        }
    }

    /// Apply one bus command. Messages that are not player commands are
    /// ignored; commands arriving while nothing is loaded are ignored too,
    /// matching an embed that has no media cued.
    pub fn handle(&mut self, msg: &BusMessage) {
        match msg {
            BusMessage::LoadMedia {
                source, media_id, ..
            } => {
                // Loading a new source pauses the other embed so both never
                // play at once.
                if self.active.is_some() && self.active != Some(*source) {
                    if let Some(backend) = self.active_backend() {
                        backend.pause();
                    }
                }
                self.active = Some(*source);
                match source {
                    MediaSource::Video => self.video.load_by_id(media_id),
                    MediaSource::Audio => self.audio.load_by_id(media_id),
                }
            }
            BusMessage::Play => {
                if let Some(backend) = self.active_backend() {
                    backend.play();
                }
            }
            BusMessage::Pause => {
                if let Some(backend) = self.active_backend() {
                    backend.pause();
                }
            }
            BusMessage::Seek { seconds } => {
                let seconds = *seconds;
                if let Some(backend) = self.active_backend() {
                    backend.seek_to(seconds);
                }
            }
            BusMessage::SetVolume { percent } => {
                let percent = (*percent).min(100);
                // Volume applies to both backends so the level survives a
                // source switch.
                self.video.set_volume(percent);
                self.audio.set_volume(percent);
            }
            BusMessage::Clear => {
                if let Some(backend) = self.active_backend() {
                    backend.pause();
                }
                self.active = None;
            }
            BusMessage::SetVisible { visible } => {
                self.visible = *visible;
            }
            _ => {}
        }
    }
}
