//! Read-only diagnostics server for a running evolution.
//!
//! The evolution worker publishes into an [`EvolutionHub`]; the axum router
//! serves the current status over HTTP and streams every event over a
//! websocket. Nothing here ever drives the simulation.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::error::{Result, SimError};
use crate::generation::{GenerationObserver, GenerationReport, SnapshotFrame};
use crate::neuro::GenerationSummary;

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_BIND_PORT: u16 = 8797;
const PORT_FALLBACK_ATTEMPTS: u16 = 20;
const ENV_PORT: &str = "WALKER_PORT";
const EVENT_CHANNEL_CAPACITY: usize = 256;
const RECENT_FRAME_LIMIT: usize = 120;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionStatus {
    pub running: bool,
    pub finished: bool,
    pub generation: usize,
    pub total_generations: usize,
    pub population_size: usize,
    pub best_ever_fitness: f32,
    pub last_summary: Option<GenerationSummary>,
    pub last_error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvolutionStreamEvent {
    Status { status: EvolutionStatus },
    GenerationSummary { summary: GenerationSummary },
    Snapshot { frame: SnapshotFrame },
    GenerationComplete { report: GenerationReport },
    Error { message: String },
}

#[derive(Debug, Default)]
struct HubState {
    status: EvolutionStatus,
    frames: VecDeque<SnapshotFrame>,
    history: Vec<GenerationSummary>,
}

/// Shared publication point between the evolution worker and the server.
#[derive(Clone)]
pub struct EvolutionHub {
    shared: Arc<Mutex<HubState>>,
    events: broadcast::Sender<EvolutionStreamEvent>,
}

impl EvolutionHub {
    pub fn new(population_size: usize, total_generations: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Mutex::new(HubState {
                status: EvolutionStatus {
                    population_size,
                    total_generations,
                    ..EvolutionStatus::default()
                },
                ..HubState::default()
            })),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: EvolutionStreamEvent) {
        // No subscribers is the normal headless case.
        let _ = self.events.send(event);
    }

    fn publish_status(&self, status: EvolutionStatus) {
        self.publish(EvolutionStreamEvent::Status { status });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EvolutionStreamEvent> {
        self.events.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.events.receiver_count() > 0
    }

    pub fn snapshot_status(&self) -> EvolutionStatus {
        self.lock().status.clone()
    }

    pub fn snapshot_history(&self) -> Vec<GenerationSummary> {
        self.lock().history.clone()
    }

    fn recent_frames(&self) -> Vec<SnapshotFrame> {
        self.lock().frames.iter().cloned().collect()
    }

    pub fn begin_generation(&self) {
        let status = {
            let mut shared = self.lock();
            shared.frames.clear();
            shared.status.running = true;
            shared.status.generation = shared.history.len();
            shared.status.clone()
        };
        self.publish_status(status);
    }

    pub fn record_frame(&self, frame: SnapshotFrame) {
        {
            let mut shared = self.lock();
            if shared.frames.len() >= RECENT_FRAME_LIMIT {
                shared.frames.pop_front();
            }
            shared.frames.push_back(frame.clone());
        }
        self.publish(EvolutionStreamEvent::Snapshot { frame });
    }

    pub fn record_report(&self, report: GenerationReport) {
        self.publish(EvolutionStreamEvent::GenerationComplete { report });
    }

    pub fn record_summary(&self, summary: GenerationSummary) {
        {
            let mut shared = self.lock();
            shared.status.best_ever_fitness =
                shared.status.best_ever_fitness.max(summary.best_fitness);
            shared.status.last_summary = Some(summary.clone());
            shared.history.push(summary.clone());
        }
        self.publish(EvolutionStreamEvent::GenerationSummary { summary });
    }

    pub fn finish(&self) {
        let status = {
            let mut shared = self.lock();
            shared.status.running = false;
            shared.status.finished = true;
            shared.status.clone()
        };
        self.publish_status(status);
    }

    pub fn fail(&self, message: String) {
        {
            let mut shared = self.lock();
            shared.status.running = false;
            shared.status.last_error = Some(message.clone());
        }
        self.publish(EvolutionStreamEvent::Error { message });
    }

    pub fn observer(&self) -> HubObserver {
        HubObserver { hub: self.clone() }
    }
}

/// Forwards generation diagnostics into the hub. Snapshot frames are only
/// built while somebody is watching.
pub struct HubObserver {
    hub: EvolutionHub,
}

impl GenerationObserver for HubObserver {
    fn wants_snapshots(&self) -> bool {
        self.hub.has_subscribers()
    }

    fn on_snapshot(&mut self, frame: &SnapshotFrame) {
        self.hub.record_frame(frame.clone());
    }

    fn on_complete(&mut self, report: &GenerationReport) {
        self.hub.record_report(report.clone());
    }
}

pub fn router(hub: EvolutionHub) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/evolution/state", get(evolution_state_handler))
        .route("/api/evolution/history", get(evolution_history_handler))
        .route("/api/evolution/ws", get(ws_evolution_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(hub)
}

pub async fn serve(listener: TcpListener, hub: EvolutionHub) -> Result<()> {
    axum::serve(listener, router(hub)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn evolution_state_handler(State(hub): State<EvolutionHub>) -> Json<EvolutionStatus> {
    Json(hub.snapshot_status())
}

async fn evolution_history_handler(
    State(hub): State<EvolutionHub>,
) -> Json<Vec<GenerationSummary>> {
    Json(hub.snapshot_history())
}

async fn ws_evolution_handler(
    ws: WebSocketUpgrade,
    State(hub): State<EvolutionHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_evolution_socket(socket, hub))
}

async fn handle_evolution_socket(socket: WebSocket, hub: EvolutionHub) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    // Subscribe before replaying so nothing published in between is lost.
    let mut events = hub.subscribe();

    let backlog = std::iter::once(EvolutionStreamEvent::Status {
        status: hub.snapshot_status(),
    })
    .chain(
        hub.recent_frames()
            .into_iter()
            .map(|frame| EvolutionStreamEvent::Snapshot { frame }),
    );
    for event in backlog {
        if send_evolution_stream_event(&mut ws_tx, event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if send_evolution_stream_event(&mut ws_tx, event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("evolution websocket lagged by {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = ws_rx.next() => match incoming {
                // The stream is one-way; client frames other than close are ignored.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = ws_tx.close().await;
}

async fn send_evolution_stream_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: EvolutionStreamEvent,
) -> std::result::Result<(), ()> {
    let text = serde_json::to_string(&event).map_err(|err| {
        error!("cannot encode evolution event: {err}");
    })?;
    ws_tx
        .send(Message::Text(text.into()))
        .await
        .map_err(|err| info!("evolution websocket closed: {err}"))
}

/// Explicit port first, then `WALKER_PORT`, then the default.
pub fn resolve_bind_port(explicit: Option<u16>) -> u16 {
    if let Some(port) = explicit {
        return port;
    }
    if let Ok(raw_value) = std::env::var(ENV_PORT) {
        match raw_value.parse::<u16>() {
            Ok(parsed) if parsed > 0 => return parsed,
            _ => warn!("ignoring {ENV_PORT}={raw_value:?}: not a port number"),
        }
    }
    DEFAULT_BIND_PORT
}

/// Binds `host:desired_port`. When that is the default port and it is taken,
/// the next few ports are tried; an explicitly chosen port is used as is.
pub async fn bind_listener(host: &str, desired_port: u16) -> Result<(TcpListener, SocketAddr)> {
    let last_port = if desired_port == DEFAULT_BIND_PORT {
        desired_port.saturating_add(PORT_FALLBACK_ATTEMPTS)
    } else {
        desired_port
    };
    let mut port = desired_port;
    loop {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                let addr = listener.local_addr()?;
                if port != desired_port {
                    warn!("port {desired_port} busy; serving on {addr} instead");
                }
                return Ok((listener, addr));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && port < last_port => {
                port += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}
