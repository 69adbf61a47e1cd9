//! The dock authority.
//!
//! One `Dock` owns the request queue, the override pointer, the playback
//! configuration, and peer liveness: the single source of truth every
//! other surface eventually converges on. Side effects of every mutation
//! run in a fixed order: mutate in memory, persist, broadcast to peers,
//! then (conditionally) issue playback commands. Peers must never observe
//! a broadcast the dock has not itself committed to.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Duration;
use uuid::Uuid;

use crate::bus::Bus;
use crate::config::{PlaybackConfig, WheelTarget};
use crate::liveness::{PeerLiveness, Phase};
use crate::protocol::{BusMessage, QueueEntryView, SurfaceKind, WheelSegment};
use crate::queue::{MediaSource, QueueItem, RequestQueue, TitleState};
use crate::wheel::{self, SpinPlan};
use crate::{store, titles};

/// Follow-up work a dock operation scheduled; the caller owns the timers.
#[derive(Clone, Debug, PartialEq)]
pub enum FollowUp {
    /// A shuffle spin was broadcast; promote the winner after the animation
    /// and end the spin after the hold (see `run_shuffle_spin`).
    ShuffleSpin(SpinPlan),
}

/// Operator-facing snapshot for the dock UI.
#[derive(Clone, Debug, serde::Serialize)]
pub struct StatusView {
    pub queue: Vec<QueueEntryView>,
    pub now_playing: Option<QueueEntryView>,
    pub current: f64,
    pub duration: f64,
    pub config: PlaybackConfig,
    pub player: Phase,
    pub overlay: Phase,
    pub spin_pending: bool,
}

pub struct Dock {
    id: Uuid,
    bus: Bus,
    queue: RequestQueue,
    config: PlaybackConfig,
    /// Play-this-now pointer; takes priority over the queue head without
    /// mutating the queue, cleared when its media ends.
    override_item: Option<QueueItem>,
    /// Winner of a manual spin awaiting the operator's play/discard choice.
    pending_winner: Option<SpinPlan>,
    /// A broadcast spin animation is running; suppresses wheel previews.
    spin_in_flight: bool,
    player: PeerLiveness,
    overlay: PeerLiveness,
    last_current: f64,
    last_duration: f64,
}

impl Dock {
    pub fn new(bus: Bus, queue: RequestQueue, config: PlaybackConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            bus,
            queue,
            config,
            override_item: None,
            pending_winner: None,
            spin_in_flight: false,
            player: PeerLiveness::new(),
            overlay: PeerLiveness::new(),
            last_current: 0.0,
            last_duration: 0.0,
        }
    }

    /// The dock's own peer id on the bus; consumers skip frames carrying it.
    pub fn peer_id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Entries still awaiting a title lookup (used to resume resolution
    /// after a restart).
    pub fn pending_titles(&self) -> Vec<(MediaSource, String)> {
        self.queue.pending_titles()
    }

    pub fn status(&self) -> StatusView {
        StatusView {
            queue: self.queue.iter().map(entry_view).collect(),
            now_playing: self.now_playing_item().map(entry_view),
            current: self.last_current,
            duration: self.last_duration,
            config: self.config.clone(),
            player: self.player.phase(),
            overlay: self.overlay.phase(),
            spin_pending: self.pending_winner.is_some(),
        }
    }

    fn now_playing_item(&self) -> Option<&QueueItem> {
        self.override_item.as_ref().or_else(|| self.queue.head())
    }

    // --- broadcasting -------------------------------------------------------

    fn publish(&self, msg: BusMessage) {
        self.bus.publish_from(self.id, msg);
    }

    fn queue_snapshot(&self) -> BusMessage {
        BusMessage::QueueSnapshot {
            queue: self.queue.iter().map(entry_view).collect(),
            command_prefix: self.config.command_prefix.clone(),
            display: self.config.display_settings(),
        }
    }

    fn now_playing_snapshot(&self) -> BusMessage {
        match self.now_playing_item() {
            Some(item) => BusMessage::NowPlayingSnapshot {
                item: Some(entry_view(item)),
                current: self.last_current,
                duration: self.last_duration,
            },
            None => BusMessage::NowPlayingSnapshot {
                item: None,
                current: 0.0,
                duration: 0.0,
            },
        }
    }

    fn broadcast_state(&self) {
        self.publish(self.queue_snapshot());
        self.publish(self.now_playing_snapshot());
    }

    /// Idle wheel on the target surface, refreshed as the queue changes.
    /// Nothing is sent mid-spin or while a winner awaits its verdict.
    fn broadcast_preview(&self) {
        if self.config.wheel_target == WheelTarget::None
            || self.spin_in_flight
            || self.pending_winner.is_some()
        {
            return;
        }
        self.publish(BusMessage::SpinPreview {
            segments: self.segments(),
            target: self.config.wheel_target,
        });
    }

    fn segments(&self) -> Vec<WheelSegment> {
        self.queue
            .iter()
            .map(|item| WheelSegment {
                source: item.source,
                media_id: item.media_id.clone(),
                label: item.display_title().to_string(),
            })
            .collect()
    }

    // --- persistence --------------------------------------------------------

    async fn persist_queue(&self) {
        match serde_json::to_string(&self.queue) {
            Ok(blob) => store::save_blob(store::QUEUE_BLOB, blob).await,
            Err(e) => tracing::warn!("failed to serialize queue: {e}"),
        }
    }

    async fn persist_config(&self) {
        match serde_json::to_string(&self.config) {
            Ok(blob) => store::save_blob(store::CONFIG_BLOB, blob).await,
            Err(e) => tracing::warn!("failed to serialize config: {e}"),
        }
    }

    // --- playback commands (all gated on player liveness) -------------------

    fn load_and_play(&mut self, item: &QueueItem) {
        if !self.player.is_live() {
            return;
        }
        if self.config.show_video {
            self.publish(BusMessage::SetVisible { visible: true });
        }
        tracing::info!(
            "load and play: {} ({:?}, requested by {})",
            item.display_title(),
            item.source,
            item.requested_by
        );
        self.publish(BusMessage::LoadMedia {
            source: item.source,
            media_id: item.media_id.clone(),
            thumbnail_url: item.thumbnail_url.clone(),
        });
        self.publish(BusMessage::Play);
    }

    fn clear_player(&mut self) {
        self.last_current = 0.0;
        self.last_duration = 0.0;
        if self.player.is_live() {
            self.publish(BusMessage::Clear);
        }
        self.update_visibility();
    }

    /// Video area is shown only while show-video is on and there is
    /// something to show (media loaded or queued).
    fn update_visibility(&self) {
        if !self.player.is_live() {
            return;
        }
        let visible = self.config.show_video && (self.last_duration > 0.0 || !self.queue.is_empty());
        self.publish(BusMessage::SetVisible { visible });
    }

    // --- queue operations ---------------------------------------------------

    /// Append a request. Returns false (and changes nothing) when an
    /// equivalent item is already queued.
    pub async fn enqueue(&mut self, source: MediaSource, media_id: &str, requested_by: &str) -> bool {
        let item = QueueItem::new(source, media_id, requested_by);
        if !self.queue.push(item) {
            tracing::info!("duplicate request rejected: {media_id}");
            return false;
        }
        tracing::info!("queued {media_id} (requested by {requested_by})");
        self.persist_queue().await;
        self.broadcast_state();
        self.broadcast_preview();

        let first = self.queue.len() == 1 && self.override_item.is_none();
        if first && self.config.autoplay_when_empty && self.player.is_live() {
            if let Some(head) = self.queue.head().cloned() {
                self.load_and_play(&head);
            }
        }
        true
    }

    /// Remove by index; out-of-range is a no-op. Removing the playing slot
    /// advances playback to the new head (or clears the player).
    pub async fn remove_at(&mut self, index: usize) -> bool {
        let was_playing = index == 0 && self.override_item.is_none();
        let Some(removed) = self.queue.remove_at(index) else {
            return false;
        };
        tracing::info!("removed from queue: {}", removed.display_title());
        self.persist_queue().await;
        self.broadcast_state();
        self.broadcast_preview();

        if was_playing {
            if let Some(head) = self.queue.head().cloned() {
                self.load_and_play(&head);
            } else {
                self.clear_player();
            }
        }
        true
    }

    /// Reorder upcoming items; the playing slot is pinned.
    pub async fn move_item(&mut self, from: usize, to: usize) -> bool {
        if !self.queue.move_item(from, to) {
            return false;
        }
        self.persist_queue().await;
        self.broadcast_state();
        self.broadcast_preview();
        true
    }

    /// "Play now": promote an upcoming item into the playing slot and start
    /// it. Leaves any override untouched per the double-activate semantics.
    pub async fn play_now(&mut self, index: usize) -> bool {
        if !self.queue.promote(index) {
            return false;
        }
        self.persist_queue().await;
        self.broadcast_state();
        self.broadcast_preview();
        if let Some(head) = self.queue.head().cloned() {
            self.load_and_play(&head);
        }
        true
    }

    /// The player reported its media ended: clear an override or pop the
    /// head, then either spin (shuffle mode), start the next item, or clear.
    pub async fn advance_on_media_ended(&mut self) -> Option<FollowUp> {
        if self.override_item.take().is_some() {
            // The override was a virtual head; the queue is untouched.
        } else {
            self.queue.pop_front();
        }
        self.persist_queue().await;
        self.broadcast_state();
        self.broadcast_preview();

        if self.config.shuffle_on_end && !self.queue.is_empty() {
            return self.begin_shuffle_spin();
        }
        if let Some(head) = self.queue.head().cloned() {
            self.load_and_play(&head);
        } else {
            self.clear_player();
        }
        None
    }

    /// Operator skip: same advancement as a natural end, but only while a
    /// player is there to act on the outcome.
    pub async fn skip_to_next(&mut self) -> Option<FollowUp> {
        if !self.player.is_live() {
            return None;
        }
        if self.override_item.is_none() && self.queue.is_empty() {
            return None;
        }
        self.advance_on_media_ended().await
    }

    /// Empty the queue. An override mid-play stays; a pending or previewed
    /// wheel is torn down since its segments no longer exist.
    pub async fn clear(&mut self) {
        self.queue.clear();
        let had_wheel = self.pending_winner.take().is_some() || self.spin_in_flight;
        self.spin_in_flight = false;
        self.persist_queue().await;
        self.broadcast_state();
        if had_wheel && self.config.wheel_target != WheelTarget::None {
            self.publish(BusMessage::SpinEnd {
                target: self.config.wheel_target,
            });
        }
        self.clear_player();
    }

    // --- transport ----------------------------------------------------------

    /// Start or resume. Loads the head first when nothing is loaded yet
    /// (autoplay off and a track was queued into an idle player).
    pub fn play(&mut self) {
        if !self.player.is_live() {
            return;
        }
        if self.override_item.is_none() && self.queue.is_empty() {
            return;
        }
        if self.last_duration <= 0.0 {
            if let Some(head) = self.queue.head().cloned() {
                self.load_and_play(&head);
            }
        } else {
            self.publish(BusMessage::Play);
        }
    }

    pub fn pause(&mut self) {
        if !self.player.is_live() {
            return;
        }
        self.publish(BusMessage::Pause);
    }

    /// Clamped to the last known duration; a no-op while nothing is loaded.
    pub fn seek(&mut self, seconds: f64) {
        if !self.player.is_live() || self.last_duration <= 0.0 {
            return;
        }
        let seconds = seconds.clamp(0.0, self.last_duration);
        self.publish(BusMessage::Seek { seconds });
    }

    pub fn set_volume(&mut self, percent: u8) {
        if !self.player.is_live() {
            return;
        }
        self.publish(BusMessage::SetVolume {
            percent: percent.min(100),
        });
    }

    // --- wheel --------------------------------------------------------------

    /// Operator-triggered spin over the whole queue. The winner is chosen
    /// here and handed back so the dock UI can animate it; target surfaces
    /// get the same plan over the bus. Rejected while the queue is empty or
    /// a winner is already pending.
    pub fn spin_start(&mut self) -> Option<SpinPlan> {
        if self.pending_winner.is_some() || self.spin_in_flight {
            return None;
        }
        let plan = wheel::plan_spin(self.segments())?;
        self.pending_winner = Some(plan.clone());
        if self.config.wheel_target != WheelTarget::None {
            self.publish(BusMessage::SpinStart {
                segments: plan.segments.clone(),
                winner_index: plan.winner_index,
                stop_angle: plan.stop_angle,
                start_delay_ms: 0,
                target: self.config.wheel_target,
            });
        }
        Some(plan)
    }

    /// Play the pending manual-spin winner: pull it out of the queue,
    /// install it as the override, and start it.
    pub async fn spin_play_winner(&mut self) -> bool {
        let Some(plan) = self.pending_winner.take() else {
            return false;
        };
        let Some(segment) = plan.segments.get(plan.winner_index) else {
            return false;
        };
        let item = self
            .queue
            .remove_matching(segment.source, &segment.media_id)
            .unwrap_or_else(|| {
                // The operator removed the winner mid-decision; play the
                // selected media anyway, labelled by its segment.
                let mut item = QueueItem::new(segment.source, segment.media_id.clone(), crate::queue::NO_REQUESTER);
                item.title = TitleState::Resolved(segment.label.clone());
                item
            });
        tracing::info!("wheel winner: {}", item.display_title());
        self.override_item = Some(item);
        self.persist_queue().await;
        self.broadcast_state();
        if let Some(over) = self.override_item.clone() {
            self.load_and_play(&over);
        }
        if self.config.wheel_target != WheelTarget::None {
            self.publish(BusMessage::SpinEnd {
                target: self.config.wheel_target,
            });
        }
        self.broadcast_preview();
        true
    }

    /// Discard the pending winner without playing it.
    pub fn spin_discard(&mut self) -> bool {
        if self.pending_winner.take().is_none() {
            return false;
        }
        if self.config.wheel_target != WheelTarget::None {
            self.publish(BusMessage::SpinEnd {
                target: self.config.wheel_target,
            });
        }
        self.broadcast_preview();
        true
    }

    /// Shuffle-on-end: pick and broadcast in one step; the winner is
    /// promoted by `run_shuffle_spin` once the animation window has passed.
    fn begin_shuffle_spin(&mut self) -> Option<FollowUp> {
        let plan = wheel::plan_spin(self.segments())?;
        self.spin_in_flight = true;
        self.publish(BusMessage::SpinStart {
            segments: plan.segments.clone(),
            winner_index: plan.winner_index,
            stop_angle: plan.stop_angle,
            start_delay_ms: wheel::SPIN_START_DELAY_MS,
            target: self.config.wheel_target,
        });
        Some(FollowUp::ShuffleSpin(plan))
    }

    /// Second half of the shuffle spin, called after the animation window.
    pub async fn finish_shuffle_spin(&mut self, plan: &SpinPlan) {
        if !self.spin_in_flight {
            // Torn down (queue cleared) while the wheel was turning.
            return;
        }
        let Some(segment) = plan.segments.get(plan.winner_index) else {
            return;
        };
        let Some(item) = self.queue.remove_matching(segment.source, &segment.media_id) else {
            // Winner vanished mid-spin; fall back to linear advance.
            self.spin_in_flight = false;
            if let Some(head) = self.queue.head().cloned() {
                self.load_and_play(&head);
            } else {
                self.clear_player();
            }
            return;
        };
        tracing::info!("shuffle winner: {}", item.display_title());
        self.override_item = Some(item);
        self.persist_queue().await;
        self.broadcast_state();
        if let Some(over) = self.override_item.clone() {
            self.load_and_play(&over);
        }
    }

    /// Ends the spin visualization after the winner hold. Renderers are
    /// never awaited; the shared delay constants are the only sync point.
    pub fn end_spin(&mut self) {
        if !self.spin_in_flight {
            return;
        }
        self.spin_in_flight = false;
        self.publish(BusMessage::SpinEnd {
            target: self.config.wheel_target,
        });
        self.broadcast_preview();
    }

    // --- configuration ------------------------------------------------------

    /// Replace the configuration (operator settings form). Persists
    /// immediately and re-broadcasts so surfaces pick the change up.
    pub async fn set_config(&mut self, config: PlaybackConfig) {
        let config = config.sanitize();
        let target_was = self.config.wheel_target;
        self.config = config;
        self.persist_config().await;
        self.broadcast_state();
        self.update_visibility();
        if self.config.wheel_target != WheelTarget::None {
            self.broadcast_preview();
        } else if target_was != WheelTarget::None {
            // Wheel display switched off; clear whatever a surface renders.
            self.publish(BusMessage::SpinEnd { target: target_was });
        }
    }

    // --- titles -------------------------------------------------------------

    /// A title lookup finished. Applies only while the entry is still
    /// pending; the re-broadcast snapshots carry the new label.
    pub async fn apply_title(
        &mut self,
        source: MediaSource,
        media_id: &str,
        meta: Option<titles::ResolvedMeta>,
    ) {
        let (title, thumb) = match meta {
            Some(m) => (Some(m.title), m.thumbnail_url),
            None => (None, None),
        };
        let mut changed = self.queue.apply_title(source, media_id, title.clone(), thumb.clone());
        if let Some(over) = self.override_item.as_mut() {
            if over.source == source
                && over.canonical_id() == crate::queue::canonical_media_id(source, media_id)
                && over.title == TitleState::Pending
            {
                over.title = match title {
                    Some(t) => TitleState::Resolved(t),
                    None => TitleState::Failed,
                };
                if thumb.is_some() {
                    over.thumbnail_url = thumb;
                }
                changed = true;
            }
        }
        if changed {
            self.persist_queue().await;
            self.broadcast_state();
            self.broadcast_preview();
        }
    }

    // --- bus input ----------------------------------------------------------

    /// Route one frame from another peer. Unknown kinds were already dropped
    /// at the decode boundary; kinds the dock does not consume are ignored.
    pub async fn handle_bus(&mut self, msg: BusMessage) -> Option<FollowUp> {
        match msg {
            BusMessage::Hello { surface, .. } => {
                self.peer_signal(surface);
                // A (re)joining surface gets fresh state without waiting for
                // the next mutation.
                self.broadcast_state();
                self.broadcast_preview();
                None
            }
            BusMessage::Ping { surface, .. } => {
                self.peer_signal(surface);
                None
            }
            BusMessage::StateRequest => {
                // Overlays ask for state on load; the request doubles as a
                // liveness signal.
                self.peer_signal(SurfaceKind::NowPlaying);
                self.broadcast_state();
                None
            }
            BusMessage::Progress { current, duration } => {
                self.last_current = current;
                self.last_duration = duration;
                self.publish(self.now_playing_snapshot());
                None
            }
            BusMessage::Ended => self.advance_on_media_ended().await,
            _ => None,
        }
    }

    fn peer_signal(&mut self, surface: SurfaceKind) {
        let now = tokio::time::Instant::now().into_std();
        match surface {
            SurfaceKind::Player => {
                if self.player.heartbeat(now) {
                    tracing::info!("player surface connected");
                    self.update_visibility();
                }
            }
            SurfaceKind::NowPlaying => {
                if self.overlay.heartbeat(now) {
                    tracing::info!("now-playing surface connected");
                }
            }
            SurfaceKind::Dock => {}
        }
    }

    /// Periodic liveness sweep; also the engine's own heartbeat.
    pub fn sweep(&mut self) {
        let now = tokio::time::Instant::now().into_std();
        if self.player.sweep(now) {
            tracing::warn!("player surface disconnected (no heartbeat)");
        }
        if self.overlay.sweep(now) {
            tracing::warn!("now-playing surface disconnected (no heartbeat)");
        }
    }

    pub fn heartbeat_tick(&self) {
        self.publish(BusMessage::Ping {
            surface: SurfaceKind::Dock,
            peer_id: Some(self.id),
        });
    }
}

fn entry_view(item: &QueueItem) -> QueueEntryView {
    QueueEntryView {
        source: item.source,
        media_id: item.media_id.clone(),
        title: match &item.title {
            TitleState::Resolved(t) => Some(t.clone()),
            _ => None,
        },
        requested_by: item.requested_by.clone(),
        thumbnail_url: item.thumbnail_url.clone(),
    }
}

/// Drive the timed half of a shuffle spin: wait out the lead-in and the
/// animation, promote the winner, hold on it, then end the visualization.
/// The delays are constants shared with renderers; there is no
/// acknowledgement protocol.
pub async fn run_shuffle_spin(dock: Arc<Mutex<Dock>>, plan: SpinPlan) {
    tokio::time::sleep(Duration::from_millis(
        wheel::SPIN_START_DELAY_MS + wheel::SPIN_ANIMATION_MS,
    ))
    .await;
    dock.lock().await.finish_shuffle_spin(&plan).await;
    tokio::time::sleep(Duration::from_millis(wheel::SPIN_WINNER_HOLD_MS)).await;
    dock.lock().await.end_spin();
}
