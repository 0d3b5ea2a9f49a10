//! HTTP + WebSocket session service
//!
//! A remote client (typically a browser running the detection model) pushes
//! frames; each session owns one detection loop on its own task.
//!
//! Endpoints:
//! - POST /session/new - Create session and start its loop
//! - GET /session/{id} - Latest detection snapshot
//! - POST /session/{id}/sample - Push one frame
//! - POST /session/{id}/capture-complete - Capture handled, re-arm
//! - POST /session/{id}/reset - Reset tracking and liveness
//! - DELETE /session/{id} - Stop and remove
//! - WS /ws/{id} - Live loop events
//! - GET /health - Health check

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};

use crate::config::GateConfig;
use crate::core::{BroadcastObserver, ChannelSource, DetectionLoop, LoopHandle};
use crate::error::GateError;
use crate::types::{ChallengeKind, DetectionSnapshot, FrameSample, LoopEvent};

/// Frames queued per session before pushes are refused
const SAMPLE_QUEUE: usize = 16;

/// Events buffered per WebSocket subscriber
const EVENT_BUFFER: usize = 256;

/// Session state
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub handle: LoopHandle,
    pub sample_tx: mpsc::Sender<FrameSample>,
    pub update_tx: broadcast::Sender<LoopEvent>,
    pub challenges: Vec<ChallengeKind>,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, Session>>,
    pub config: GateConfig,
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
pub struct NewSessionRequest {
    /// Overrides the configured challenge list
    pub challenges: Option<Vec<ChallengeKind>>,
}

/// Create new session response
#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
    pub challenges: Vec<ChallengeKind>,
}

/// Session status response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub state: String,
    pub message: String,
    pub stopped: bool,
    pub detection: DetectionSnapshot,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create the API router
pub fn create_router(config: GateConfig) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        config,
    });

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session).delete(delete_session))
        .route("/session/:id/sample", post(push_sample))
        .route("/session/:id/capture-complete", post(capture_complete))
        .route("/session/:id/reset", post(reset_session))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

/// Create a session and spawn its detection loop
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut config = state.config.clone();
    if let Some(challenges) = req.challenges {
        config.challenges = challenges;
    }

    let mut detection_loop = DetectionLoop::new(config.clone()).map_err(bad_request)?;
    let handle = detection_loop.handle();
    let (sample_tx, mut source) = ChannelSource::channel(SAMPLE_QUEUE);
    let (update_tx, _) = broadcast::channel(EVENT_BUFFER);
    let mut observer = BroadcastObserver::new(update_tx.clone());

    let session_id = generate_session_id();
    let task_id = session_id.clone();
    tokio::spawn(async move {
        if let Err(e) = detection_loop.run(&mut source, &mut observer).await {
            warn!(session = %task_id, error = %e, "session loop ended with error");
        }
    });

    let session = Session {
        id: session_id.clone(),
        handle,
        sample_tx,
        update_tx,
        challenges: config.challenges.clone(),
    };
    state.sessions.write().await.insert(session_id.clone(), session);
    info!(session = %session_id, challenges = ?config.challenges, "session created");

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
        challenges: config.challenges,
    }))
}

/// Get session status
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let detection = session.handle.current_detection();

    Ok(Json(SessionStatusResponse {
        session_id: session.id.clone(),
        state: detection.state.code().to_string(),
        message: detection.state.message().to_string(),
        stopped: session.handle.is_stopped(),
        detection,
    }))
}

/// Push one frame into the session's loop
async fn push_sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(frame): Json<FrameSample>,
) -> StatusCode {
    let sessions = state.sessions.read().await;
    let Some(session) = sessions.get(&id) else {
        return StatusCode::NOT_FOUND;
    };
    if session.handle.is_stopped() {
        return StatusCode::GONE;
    }
    match session.sample_tx.try_send(frame) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(mpsc::error::TrySendError::Full(_)) => StatusCode::TOO_MANY_REQUESTS,
        Err(mpsc::error::TrySendError::Closed(_)) => StatusCode::GONE,
    }
}

/// Caller handled the capture
async fn capture_complete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    with_handle(&state, &id, LoopHandle::capture_finished).await
}

/// Reset tracking and liveness
async fn reset_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    with_handle(&state, &id, LoopHandle::reset).await
}

/// Stop the loop and forget the session
async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.write().await.remove(&id) {
        Some(session) => {
            session.handle.stop();
            info!(session = %id, "session removed");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn with_handle(state: &AppState, id: &str, action: fn(&LoopHandle)) -> StatusCode {
    match state.sessions.read().await.get(id) {
        Some(session) => {
            action(&session.handle);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let rx = session.update_tx.subscribe();
    drop(sessions);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward loop events until either side goes away
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<LoopEvent>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(event) => {
                    let Some(message) = event_message(&event) else {
                        continue;
                    };
                    if sender.send(message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Text frame for one event; `None` (logged) when it cannot be encoded
fn event_message(event: &LoopEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            warn!(error = %e, "skipping event that failed to encode");
            None
        }
    }
}

fn bad_request(err: GateError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// Generate session ID
fn generate_session_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session_{:x}_{}", nanos, seq)
}

/// Run the API server
pub async fn run_server(addr: &str, config: GateConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let router = create_router(config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "facegate API listening");
    info!("  POST   /session/new                  - Create session");
    info!("  GET    /session/:id                  - Latest detection");
    info!("  POST   /session/:id/sample           - Push frame");
    info!("  POST   /session/:id/capture-complete - Re-arm after capture");
    info!("  POST   /session/:id/reset            - Reset session");
    info!("  DELETE /session/:id                  - Stop session");
    info!("  WS     /ws/:id                       - Live events");
    axum::serve(listener, router).await?;
    Ok(())
}
