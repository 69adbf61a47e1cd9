use std::net::SocketAddr;
use std::sync::Arc;

// MediaRequest engine
//
// The engine is the authority for the song-request queue:
//   - Owns queue, override, and playback configuration (persisted in SQLite)
//   - Hosts the broadcast topic the surfaces coordinate over (/ws)
//   - Serves the surface bundles and a small JSON API for the dock UI
//
// The player and now-playing overlay run as browser sources in the
// streaming software; they attach to /ws, apply snapshots to their local
// state, and report heartbeats/progress back.

use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mediarequest_engine::bus::{self, Bus};
use mediarequest_engine::chat;
use mediarequest_engine::config::PlaybackConfig;
use mediarequest_engine::dock::{run_shuffle_spin, Dock, FollowUp, StatusView};
use mediarequest_engine::liveness::HEARTBEAT_INTERVAL;
use mediarequest_engine::queue::{MediaSource, RequestQueue};
use mediarequest_engine::store;
use mediarequest_engine::titles::TitleResolver;

#[derive(Clone)]
struct AppState {
    version: String,
    dock: Arc<Mutex<Dock>>,
    bus: Bus,
    titles: Arc<TitleResolver>,
}

async fn load_queue_from_db_or_empty() -> RequestQueue {
    match store::load_blob(store::QUEUE_BLOB).await {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(queue) => queue,
            Err(e) => {
                warn!("persisted queue is unreadable, starting empty: {e}");
                RequestQueue::new()
            }
        },
        None => RequestQueue::new(),
    }
}

async fn load_config_from_db_or_default() -> PlaybackConfig {
    match store::load_blob(store::CONFIG_BLOB).await {
        Some(raw) => match serde_json::from_str::<PlaybackConfig>(&raw) {
            Ok(config) => config.sanitize(),
            Err(e) => {
                warn!("persisted config is unreadable, using defaults: {e}");
                PlaybackConfig::default()
            }
        },
        None => PlaybackConfig::default(),
    }
}

/// Root endpoint: the surface bundles live under /dock, /player and
/// /now-playing; everything else is API/WebSocket.
async fn root() -> &'static str {
    "MediaRequest engine is running. Surfaces: /dock/ /player/ /now-playing/ - API: /api/v1/status"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let version = env!("CARGO_PKG_VERSION").to_string();

    let queue = load_queue_from_db_or_empty().await;
    let config = load_config_from_db_or_default().await;
    info!(
        "loaded state: {} queued item(s), channel {:?}, prefix !{}",
        queue.len(),
        config.channel,
        config.command_prefix
    );

    let bus = Bus::new();
    let dock = Arc::new(Mutex::new(Dock::new(bus.clone(), queue, config)));

    let state = AppState {
        version,
        dock: dock.clone(),
        bus: bus.clone(),
        titles: Arc::new(TitleResolver::new()),
    };

    // Queued items loaded from SQLite may still be missing titles (the
    // engine went down mid-resolution); retry them now.
    for (source, media_id) in dock.lock().await.pending_titles() {
        spawn_title_resolution(&state, source, media_id);
    }

    tokio::spawn(run_bus_consumer(state.clone()));
    tokio::spawn(run_timers(dock.clone()));

    let app = build_router(state);

    // Bind loopback only; the streaming software and dock run on this host.
    let addr: SocketAddr = std::env::var("MEDIAREQUEST_BIND")
        .unwrap_or_else(|_| "127.0.0.1:3001".to_string())
        .parse()?;

    info!("MediaRequest engine starting on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let surfaces_dir =
        std::env::var("MEDIAREQUEST_SURFACES_DIR").unwrap_or_else(|_| "surfaces".to_string());

    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "OK" }))
        .route("/ws", get(ws_handler))
        .route("/api/v1/status", get(status))
        .route("/api/v1/queue/add", post(api_queue_add))
        .route("/api/v1/queue/remove", post(api_queue_remove))
        .route("/api/v1/queue/move", post(api_queue_move))
        .route("/api/v1/queue/play-now", post(api_queue_play_now))
        .route("/api/v1/queue/clear", post(api_queue_clear))
        .route("/api/v1/transport/play", post(api_transport_play))
        .route("/api/v1/transport/pause", post(api_transport_pause))
        .route("/api/v1/transport/skip", post(api_transport_skip))
        .route("/api/v1/transport/seek", post(api_transport_seek))
        .route("/api/v1/transport/volume", post(api_transport_volume))
        .route("/api/v1/spin/start", post(api_spin_start))
        .route("/api/v1/spin/play-winner", post(api_spin_play_winner))
        .route("/api/v1/spin/discard", post(api_spin_discard))
        .route("/api/v1/config", post(api_config_set))
        .route("/api/v1/chat/command", post(api_chat_command))
        .fallback_service(ServeDir::new(surfaces_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- bus + timers ----------------------------------------------------------

/// The engine's own seat on the broadcast topic: consume peer frames and
/// feed them to the dock state machine.
async fn run_bus_consumer(state: AppState) {
    let engine_id = state.dock.lock().await.peer_id();
    let mut rx = state.bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if frame.from == engine_id {
                    continue;
                }
                let follow_up = state.dock.lock().await.handle_bus(frame.msg).await;
                if let Some(FollowUp::ShuffleSpin(plan)) = follow_up {
                    tokio::spawn(run_shuffle_spin(state.dock.clone(), plan));
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("engine bus consumer lagged, dropped {n} frames");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Liveness sweep (1 s) and the engine's own heartbeat (surfaces display
/// dock connectivity the same way the dock displays theirs).
async fn run_timers(dock: Arc<Mutex<Dock>>) {
    let mut sweep = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = sweep.tick() => dock.lock().await.sweep(),
            _ = heartbeat.tick() => dock.lock().await.heartbeat_tick(),
        }
    }
}

fn spawn_title_resolution(state: &AppState, source: MediaSource, media_id: String) {
    let state = state.clone();
    tokio::spawn(async move {
        let meta = state.titles.resolve(source, &media_id).await;
        state
            .dock
            .lock()
            .await
            .apply_title(source, &media_id, meta)
            .await;
    });
}

// --- handlers ---------------------------------------------------------------

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| bus::serve_socket(socket, state.bus.clone()))
}

#[derive(serde::Serialize)]
struct StatusResponse {
    version: String,
    #[serde(flatten)]
    dock: StatusView,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let dock = state.dock.lock().await.status();
    Json(StatusResponse {
        version: state.version.clone(),
        dock,
    })
}

#[derive(Deserialize)]
struct QueueAddReq {
    url: String,
    requested_by: Option<String>,
}

async fn api_queue_add(
    State(state): State<AppState>,
    Json(req): Json<QueueAddReq>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(media) = chat::parse_media_ref(&req.url) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let requested_by = req.requested_by.unwrap_or_else(|| "Manual Add".to_string());
    let added = state
        .dock
        .lock()
        .await
        .enqueue(media.source, &media.media_id, &requested_by)
        .await;
    if added {
        spawn_title_resolution(&state, media.source, media.media_id);
    }
    Ok(Json(json!({"ok": true, "added": added})))
}

#[derive(Deserialize)]
struct ChatCommandReq {
    user: String,
    command: String,
    text: String,
}

/// Ingestion seam for the external chat component: it calls back here with
/// `(user, command, text)` for every prefixed chat command it sees.
async fn api_chat_command(
    State(state): State<AppState>,
    Json(req): Json<ChatCommandReq>,
) -> Json<serde_json::Value> {
    let prefix = state.dock.lock().await.config().command_prefix.clone();
    if !chat::matches_prefix(&req.command, &prefix) {
        return Json(json!({"ok": true, "matched": false, "added": false}));
    }
    let Some(media) = chat::parse_media_ref(&req.text) else {
        return Json(json!({"ok": true, "matched": true, "added": false}));
    };
    let requested_by = if req.user.trim().is_empty() {
        mediarequest_engine::queue::NO_REQUESTER.to_string()
    } else {
        req.user.clone()
    };
    let added = state
        .dock
        .lock()
        .await
        .enqueue(media.source, &media.media_id, &requested_by)
        .await;
    if added {
        spawn_title_resolution(&state, media.source, media.media_id);
    }
    // `added: false` surfaces back to the requester as a duplicate notice.
    Json(json!({"ok": true, "matched": true, "added": added}))
}

#[derive(Deserialize)]
struct QueueRemoveReq {
    index: usize,
}

async fn api_queue_remove(
    State(state): State<AppState>,
    Json(req): Json<QueueRemoveReq>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !state.dock.lock().await.remove_at(req.index).await {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({"ok": true})))
}

#[derive(Deserialize)]
struct QueueMoveReq {
    from: usize,
    to: usize,
}

async fn api_queue_move(
    State(state): State<AppState>,
    Json(req): Json<QueueMoveReq>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    // Index 0 is the playing slot and stays put; equal indices are a no-op.
    if !state.dock.lock().await.move_item(req.from, req.to).await {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({"ok": true})))
}

#[derive(Deserialize)]
struct QueuePlayNowReq {
    index: usize,
}

async fn api_queue_play_now(
    State(state): State<AppState>,
    Json(req): Json<QueuePlayNowReq>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !state.dock.lock().await.play_now(req.index).await {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({"ok": true})))
}

async fn api_queue_clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.dock.lock().await.clear().await;
    Json(json!({"ok": true}))
}

async fn api_transport_play(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.dock.lock().await.play();
    Json(json!({"ok": true}))
}

async fn api_transport_pause(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.dock.lock().await.pause();
    Json(json!({"ok": true}))
}

async fn api_transport_skip(State(state): State<AppState>) -> Json<serde_json::Value> {
    let follow_up = state.dock.lock().await.skip_to_next().await;
    if let Some(FollowUp::ShuffleSpin(plan)) = follow_up {
        tokio::spawn(run_shuffle_spin(state.dock.clone(), plan));
    }
    Json(json!({"ok": true}))
}

#[derive(Deserialize)]
struct SeekReq {
    seconds: f64,
}

async fn api_transport_seek(
    State(state): State<AppState>,
    Json(req): Json<SeekReq>,
) -> Json<serde_json::Value> {
    state.dock.lock().await.seek(req.seconds);
    Json(json!({"ok": true}))
}

#[derive(Deserialize)]
struct VolumeReq {
    percent: u8,
}

async fn api_transport_volume(
    State(state): State<AppState>,
    Json(req): Json<VolumeReq>,
) -> Json<serde_json::Value> {
    state.dock.lock().await.set_volume(req.percent);
    Json(json!({"ok": true}))
}

async fn api_spin_start(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    // The dock UI animates from the same plan the bus carries.
    let Some(plan) = state.dock.lock().await.spin_start() else {
        return Err(StatusCode::CONFLICT);
    };
    Ok(Json(json!({
        "ok": true,
        "winner_index": plan.winner_index,
        "stop_angle": plan.stop_angle,
        "segments": plan.segments,
    })))
}

async fn api_spin_play_winner(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !state.dock.lock().await.spin_play_winner().await {
        return Err(StatusCode::CONFLICT);
    }
    Ok(Json(json!({"ok": true})))
}

async fn api_spin_discard(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !state.dock.lock().await.spin_discard() {
        return Err(StatusCode::CONFLICT);
    }
    Ok(Json(json!({"ok": true})))
}

async fn api_config_set(
    State(state): State<AppState>,
    Json(config): Json<PlaybackConfig>,
) -> Json<serde_json::Value> {
    state.dock.lock().await.set_config(config).await;
    Json(json!({"ok": true}))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
