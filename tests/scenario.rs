//! Cross-surface scenarios: the dock authority, a player surface built on
//! the command executor, and an overlay driven by broadcast snapshots, all
//! wired over the in-process bus.

use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

use mediarequest_engine::bus::{Bus, BusFrame};
use mediarequest_engine::chat;
use mediarequest_engine::config::{DisplayMode, PlaybackConfig};
use mediarequest_engine::dock::{Dock, FollowUp};
use mediarequest_engine::player::{CommandExecutor, MediaBackend};
use mediarequest_engine::protocol::{BusMessage, SurfaceKind};
use mediarequest_engine::queue::{MediaSource, RequestQueue};
use mediarequest_engine::rotation::{Panel, RotationInputs, RotationMachine, RotationView};

fn test_store() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let path = std::env::temp_dir().join(format!("mediarequest-scenario-{}.db", Uuid::new_v4()));
        std::env::set_var("MEDIAREQUEST_DB_PATH", path);
    });
}

fn setup(config: PlaybackConfig) -> (Dock, Receiver<BusFrame>) {
    test_store();
    let bus = Bus::new();
    let rx = bus.subscribe();
    let dock = Dock::new(bus, RequestQueue::new(), config);
    (dock, rx)
}

fn drain(rx: &mut Receiver<BusFrame>) -> Vec<BusMessage> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(frame.msg);
    }
    out
}

/// Backend double whose call log outlives the executor that owns it.
#[derive(Clone, Default)]
struct RecordingBackend {
    calls: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl RecordingBackend {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl MediaBackend for RecordingBackend {
    fn load_by_id(&mut self, media_id: &str) {
        self.record(format!("load:{media_id}"));
    }
    fn play(&mut self) {
        self.record("play".into());
    }
    fn pause(&mut self) {
        self.record("pause".into());
    }
    fn seek_to(&mut self, seconds: f64) {
        self.record(format!("seek:{seconds}"));
    }
    fn set_volume(&mut self, percent: u8) {
        self.record(format!("volume:{percent}"));
    }
    fn current_time(&self) -> f64 {
        0.0
    }
    fn duration(&self) -> f64 {
        0.0
    }
}

/// The operator sets prefix `sr`; `!sr <url>` from chat enqueues the video
/// and, with autoplay on and the player live, the player surface receives
/// load-and-play for exactly that id.
#[tokio::test]
async fn chat_request_flows_to_the_player_surface() {
    let config = PlaybackConfig {
        command_prefix: "sr".into(),
        autoplay_when_empty: true,
        ..Default::default()
    };
    let (mut dock, mut rx) = setup(config);

    // Player surface comes up and says hello.
    dock.handle_bus(BusMessage::Hello {
        surface: SurfaceKind::Player,
        peer_id: None,
    })
    .await;
    drain(&mut rx);

    // Chat ingestion hands the dock `(user, command, text)`.
    let (user, command, text) = ("alice", "sr", "https://youtu.be/dQw4w9WgXcQ");
    assert!(chat::matches_prefix(command, &dock.config().command_prefix));
    let media = chat::parse_media_ref(text).expect("url should parse");
    assert_eq!(media.source, MediaSource::Video);
    assert_eq!(media.media_id, "dQw4w9WgXcQ");
    assert!(dock.enqueue(media.source, &media.media_id, user).await);

    // The player surface applies the command stream to its backends.
    let video = RecordingBackend::default();
    let mut executor = CommandExecutor::new(video.clone(), RecordingBackend::default());
    let msgs = drain(&mut rx);
    for msg in &msgs {
        executor.handle(msg);
    }

    assert!(msgs.contains(&BusMessage::LoadMedia {
        source: MediaSource::Video,
        media_id: "dQw4w9WgXcQ".into(),
        thumbnail_url: None,
    }));
    assert_eq!(executor.active_source(), Some(MediaSource::Video));
    assert_eq!(video.calls(), ["load:dQw4w9WgXcQ", "play"]);

    // Snapshots carried the request attribution for the other surfaces.
    let queue_snapshot = msgs
        .iter()
        .find_map(|m| match m {
            BusMessage::QueueSnapshot { queue, .. } => Some(queue.clone()),
            _ => None,
        })
        .expect("queue snapshot broadcast");
    assert_eq!(queue_snapshot[0].requested_by, "alice");
}

/// A duplicate request is rejected without disturbing queue or player.
#[tokio::test]
async fn duplicate_chat_request_is_rejected() {
    let (mut dock, mut rx) = setup(PlaybackConfig::default());
    let media = chat::parse_media_ref("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
    assert!(dock.enqueue(media.source, &media.media_id, "alice").await);
    drain(&mut rx);

    let again = chat::parse_media_ref("https://youtu.be/dQw4w9WgXcQ?t=30").unwrap();
    assert!(!dock.enqueue(again.source, &again.media_id, "bob").await);
    assert_eq!(dock.queue_len(), 1);
    assert!(drain(&mut rx).is_empty());
}

/// Natural playthrough: each ended report advances the queue until the
/// player is cleared, and the executor tracks every step.
#[tokio::test]
async fn queue_plays_through_to_empty() {
    let config = PlaybackConfig {
        autoplay_when_empty: true,
        ..Default::default()
    };
    let (mut dock, mut rx) = setup(config);
    dock.handle_bus(BusMessage::Hello {
        surface: SurfaceKind::Player,
        peer_id: None,
    })
    .await;

    dock.enqueue(MediaSource::Video, "aaaaaaaaaaa", "alice").await;
    dock.enqueue(MediaSource::Audio, "https://soundcloud.com/x/y", "bob")
        .await;

    let mut executor = CommandExecutor::new(RecordingBackend::default(), RecordingBackend::default());
    for msg in drain(&mut rx) {
        executor.handle(&msg);
    }
    assert_eq!(executor.active_source(), Some(MediaSource::Video));

    // First track ends: the audio request takes over.
    assert!(dock
        .handle_bus(BusMessage::Ended)
        .await
        .is_none());
    for msg in drain(&mut rx) {
        executor.handle(&msg);
    }
    assert_eq!(executor.active_source(), Some(MediaSource::Audio));
    assert_eq!(dock.queue_len(), 1);

    // Last track ends: queue empty, player cleared.
    dock.handle_bus(BusMessage::Ended).await;
    let msgs = drain(&mut rx);
    assert!(msgs.contains(&BusMessage::Clear));
    for msg in msgs {
        executor.handle(&msg);
    }
    assert_eq!(executor.active_source(), None);
    assert_eq!(dock.queue_len(), 0);
}

/// Shuffle mode: an ended report triggers a broadcast spin and, after the
/// animation window, the winner plays as an override.
#[tokio::test]
async fn shuffle_mode_spins_between_tracks() {
    let config = PlaybackConfig {
        shuffle_on_end: true,
        ..Default::default()
    };
    let (mut dock, mut rx) = setup(config);
    dock.handle_bus(BusMessage::Hello {
        surface: SurfaceKind::Player,
        peer_id: None,
    })
    .await;
    for id in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
        dock.enqueue(MediaSource::Video, id, "alice").await;
    }
    drain(&mut rx);

    let Some(FollowUp::ShuffleSpin(plan)) = dock.handle_bus(BusMessage::Ended).await else {
        panic!("expected a shuffle spin");
    };
    let spin_start = drain(&mut rx)
        .into_iter()
        .find(|m| matches!(m, BusMessage::SpinStart { .. }))
        .expect("spin start broadcast");
    let BusMessage::SpinStart {
        winner_index,
        stop_angle,
        segments,
        ..
    } = spin_start
    else {
        unreachable!()
    };
    // Every renderer derives the same resting angle from the same inputs.
    assert_eq!(winner_index, plan.winner_index);
    assert_eq!(
        stop_angle,
        mediarequest_engine::wheel::stop_angle(segments.len(), winner_index)
    );

    dock.finish_shuffle_spin(&plan).await;
    let winner_id = plan.segments[plan.winner_index].media_id.clone();
    let msgs = drain(&mut rx);
    assert!(msgs.contains(&BusMessage::LoadMedia {
        source: MediaSource::Video,
        media_id: winner_id,
        thumbnail_url: None,
    }));
    dock.end_spin();

    // The override ends; shuffle picks again from the remaining queue.
    assert!(matches!(
        dock.handle_bus(BusMessage::Ended).await,
        Some(FollowUp::ShuffleSpin(_))
    ));
}

/// Overlay behavior: snapshots drive the rotation machine; progress ticks
/// within the same item never restart it, an identity change does.
#[tokio::test]
async fn overlay_rotation_follows_snapshots() {
    let config = PlaybackConfig {
        show_next: true,
        display_mode: DisplayMode::Always,
        ..Default::default()
    };
    let (mut dock, mut rx) = setup(config);
    dock.enqueue(MediaSource::Video, "aaaaaaaaaaa", "alice").await;
    dock.enqueue(MediaSource::Video, "bbbbbbbbbbb", "bob").await;

    // Overlay-side state, rebuilt purely from broadcast frames.
    let mut machine = RotationMachine::new();
    let mut current_id: Option<String> = None;
    let mut queue_len = 0usize;
    let mut settings = dock.config().display_settings();

    let apply = |machine: &mut RotationMachine,
                     current_id: &mut Option<String>,
                     queue_len: &mut usize,
                     settings: &mut mediarequest_engine::protocol::DisplaySettings,
                     msg: BusMessage| {
        match msg {
            BusMessage::QueueSnapshot { queue, display, .. } => {
                *queue_len = queue.len();
                *settings = display;
            }
            BusMessage::NowPlayingSnapshot { item, .. } => {
                let new_id = item.map(|i| i.media_id);
                let identity_changed = new_id != *current_id;
                *current_id = new_id;
                machine.update(
                    RotationInputs {
                        has_current: current_id.is_some(),
                        has_next: *queue_len > 1,
                        show_next: settings.show_next,
                        show_add_message: settings.show_add_message,
                        display_mode: settings.display_mode,
                        panel_duration: std::time::Duration::from_secs(
                            settings.panel_duration_secs.into(),
                        ),
                    },
                    identity_changed,
                );
            }
            _ => {}
        }
    };

    for msg in drain(&mut rx) {
        apply(&mut machine, &mut current_id, &mut queue_len, &mut settings, msg);
    }
    assert_eq!(machine.view(), RotationView::Showing(Panel::Current));

    // Rotate to the "next" panel, then receive a progress tick: no restart.
    machine.tick();
    assert_eq!(machine.view(), RotationView::Showing(Panel::Next));
    dock.handle_bus(BusMessage::Progress {
        current: 42.0,
        duration: 180.0,
    })
    .await;
    for msg in drain(&mut rx) {
        apply(&mut machine, &mut current_id, &mut queue_len, &mut settings, msg);
    }
    assert_eq!(machine.view(), RotationView::Showing(Panel::Next));

    // The playing item changes: rotation restarts from the first panel.
    dock.handle_bus(BusMessage::Ended).await;
    for msg in drain(&mut rx) {
        apply(&mut machine, &mut current_id, &mut queue_len, &mut settings, msg);
    }
    assert_eq!(machine.view(), RotationView::Showing(Panel::Current));
}

/// The timed half of a shuffle spin: winner promotion waits out the lead-in
/// plus the animation, `SPIN_END` follows after the hold. Runs on a paused
/// clock so the fixed delays elapse instantly.
#[tokio::test(start_paused = true)]
async fn shuffle_spin_follow_up_promotes_then_ends() {
    use std::sync::Arc;

    use mediarequest_engine::config::WheelTarget;
    use mediarequest_engine::dock::run_shuffle_spin;

    let config = PlaybackConfig {
        shuffle_on_end: true,
        wheel_target: WheelTarget::Player,
        ..Default::default()
    };
    let (mut dock, mut rx) = setup(config);
    dock.handle_bus(BusMessage::Hello {
        surface: SurfaceKind::Player,
        peer_id: None,
    })
    .await;
    for id in ["aaaaaaaaaaa", "bbbbbbbbbbb", "ccccccccccc"] {
        dock.enqueue(MediaSource::Video, id, "alice").await;
    }
    drain(&mut rx);

    let Some(FollowUp::ShuffleSpin(plan)) = dock.handle_bus(BusMessage::Ended).await else {
        panic!("expected a shuffle spin");
    };
    drain(&mut rx);

    let dock = Arc::new(tokio::sync::Mutex::new(dock));
    run_shuffle_spin(dock.clone(), plan.clone()).await;

    let winner_id = plan.segments[plan.winner_index].media_id.clone();
    let msgs = drain(&mut rx);
    let load_at = msgs
        .iter()
        .position(|m| {
            matches!(m, BusMessage::LoadMedia { media_id, .. } if *media_id == winner_id)
        })
        .expect("winner loaded");
    let end_at = msgs
        .iter()
        .position(|m| matches!(m, BusMessage::SpinEnd { .. }))
        .expect("spin ended");
    assert!(load_at < end_at, "winner plays before the wheel is torn down");
    assert_eq!(dock.lock().await.queue_len(), 1);
}

/// Liveness gating end to end: before any hello, transport commands
/// evaporate; after a hello they flow; snapshots are re-broadcast for the
/// late joiner.
#[tokio::test]
async fn late_joining_player_gets_resynced() {
    let (mut dock, mut rx) = setup(PlaybackConfig::default());
    dock.enqueue(MediaSource::Video, "aaaaaaaaaaa", "alice").await;
    drain(&mut rx);

    dock.play();
    assert!(drain(&mut rx).is_empty());

    dock.handle_bus(BusMessage::Hello {
        surface: SurfaceKind::Player,
        peer_id: None,
    })
    .await;
    let msgs = drain(&mut rx);
    assert!(msgs
        .iter()
        .any(|m| matches!(m, BusMessage::QueueSnapshot { .. })));
    assert!(msgs
        .iter()
        .any(|m| matches!(m, BusMessage::NowPlayingSnapshot { .. })));

    dock.play();
    assert!(drain(&mut rx)
        .iter()
        .any(|m| matches!(m, BusMessage::LoadMedia { .. })));
}
