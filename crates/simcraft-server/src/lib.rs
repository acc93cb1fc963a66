//! HTTP/WebSocket simulation server.
//!
//! Serves the simcraft message protocol over two transports against one
//! shared simulation:
//!
//! - `POST /api/v1/message` — one tagged request per call, one response.
//! - `GET /ws` — a message-based connection speaking the same schema, plus
//!   asynchronous `stateUpdate` pushes while a run loop is active.
//!
//! `play`/`pause`/`reset` control a background run loop: one `step()` every
//! `delay_ms`, pushing a snapshot after each. `delay_ms = 0` runs as fast
//! as possible, stepping in batches sized toward ~500 ms per update.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use simcraft_core::protocol::{self, Request, Response};
use simcraft_core::Simulation;

/// Bounds for the fast-path batch size.
const MIN_BATCH: u64 = 10;
const MAX_BATCH: u64 = 50_000;
/// Target wall-clock time per pushed update on the fast path.
const TARGET_UPDATE_MS: u128 = 500;

/// Shared server state.
pub struct AppState {
    sim: Mutex<Simulation>,
    run_loop: Mutex<Option<JoinHandle<()>>>,
    updates: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(sim: Simulation) -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        Arc::new(Self {
            sim: Mutex::new(sim),
            run_loop: Mutex::new(None),
            updates,
        })
    }
}

#[derive(Serialize)]
struct IndexResponse {
    name: &'static str,
    version: &'static str,
    endpoints: [&'static str; 3],
}

async fn handle_index() -> Json<IndexResponse> {
    Json(IndexResponse {
        name: "simcraft-server",
        version: simcraft_core::VERSION,
        endpoints: ["/api/v1/message", "/state", "/ws"],
    })
}

async fn handle_state(State(state): State<Arc<AppState>>) -> Json<Response> {
    let sim = state.sim.lock().await;
    Json(Response::State {
        state: sim.get_simulation_state(),
    })
}

async fn handle_message(State(state): State<Arc<AppState>>, body: String) -> Json<Response> {
    Json(dispatch(&state, &body).await)
}

async fn handle_ws(State(state): State<Arc<AppState>>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| serve_socket(state, socket))
}

/// One WebSocket connection: requests in, responses out, with run-loop
/// snapshots interleaved.
async fn serve_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let mut updates = state.updates.subscribe();
    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(update) => {
                        if sink.send(Message::Text(update.into())).await.is_err() {
                            break;
                        }
                    }
                    // Skipped messages on lag are acceptable: the next
                    // snapshot supersedes anything missed.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("websocket client lagged, skipped {skipped} updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch(&state, &text).await;
                        let encoded = protocol::serialize_response(&response);
                        if sink.send(Message::Text(encoded.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("websocket receive error: {err}");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle one protocol message, intercepting run-loop control before the
/// kernel sees it.
async fn dispatch(state: &Arc<AppState>, text: &str) -> Response {
    let request = match serde_json::from_str::<Request>(text) {
        Ok(request) => request,
        Err(err) => {
            return Response::Error {
                error: err.to_string(),
                kind: "ParseError".to_string(),
            };
        }
    };
    match request {
        Request::Play { delay_ms } => {
            start_run_loop(state, delay_ms).await;
            Response::Ok
        }
        Request::Pause => {
            stop_run_loop(state).await;
            Response::Ok
        }
        Request::Reset => {
            // Reset halts the loop and clears the simulation.
            stop_run_loop(state).await;
            let mut sim = state.sim.lock().await;
            sim.reset();
            Response::Ok
        }
        request => {
            let mut sim = state.sim.lock().await;
            protocol::apply(&mut sim, request)
        }
    }
}

async fn start_run_loop(state: &Arc<AppState>, delay_ms: u64) {
    stop_run_loop(state).await;
    let task_state = Arc::clone(state);
    let handle = tokio::spawn(async move { run_loop(task_state, delay_ms).await });
    *state.run_loop.lock().await = Some(handle);
}

async fn stop_run_loop(state: &Arc<AppState>) {
    if let Some(handle) = state.run_loop.lock().await.take() {
        handle.abort();
    }
}

/// The background run loop: step, push a snapshot, repeat. Stops on the
/// first failing step, pushing the error to subscribers.
async fn run_loop(state: Arc<AppState>, delay_ms: u64) {
    let mut batch = MIN_BATCH;
    loop {
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let started = Instant::now();
        let update = {
            let mut sim = state.sim.lock().await;
            let outcome = if delay_ms > 0 {
                sim.step().map(|_| ()).map_err(|err| err.to_string())
            } else {
                sim.step_n(batch).map(|_| ()).map_err(|err| err.to_string())
            };
            match outcome {
                Ok(()) => Response::StateUpdate {
                    state: sim.get_simulation_state(),
                },
                Err(error) => {
                    warn!("run loop halted: {error}");
                    let _ = state.updates.send(protocol::serialize_response(&Response::Error {
                        error,
                        kind: "CascadeOverflow".to_string(),
                    }));
                    break;
                }
            }
        };
        let _ = state.updates.send(protocol::serialize_response(&update));
        if delay_ms == 0 {
            batch = next_batch_size(batch, started.elapsed());
            // Let waiting requests interleave between batches.
            tokio::task::yield_now().await;
        }
    }
}

/// Multiplicatively steer the fast-path batch size toward the target update
/// latency, clamped to `[MIN_BATCH, MAX_BATCH]`.
fn next_batch_size(batch: u64, elapsed: Duration) -> u64 {
    let elapsed_ms = elapsed.as_millis();
    let next = if elapsed_ms < TARGET_UPDATE_MS / 2 {
        batch.saturating_mul(2)
    } else if elapsed_ms > TARGET_UPDATE_MS * 3 / 2 {
        batch / 2
    } else {
        batch
    };
    next.clamp(MIN_BATCH, MAX_BATCH)
}

/// Build the router around a shared simulation.
pub fn build_router(sim: Simulation) -> Router {
    let state = AppState::new(sim);
    Router::new()
        .route("/", get(handle_index))
        .route("/state", get(handle_state))
        .route("/api/v1/message", post(handle_message))
        .route("/ws", get(handle_ws))
        .with_state(state)
}

/// Run the simulation server.
pub async fn run_server(sim: Simulation, host: &str, port: u16) {
    let app = build_router(sim);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcraft_core::process::{ProcessKind, ProcessRecord};
    use simcraft_core::ConnectionRecord;

    fn sim() -> Simulation {
        Simulation::new(
            &[
                ProcessRecord::new("s1", ProcessKind::Source),
                ProcessRecord::new("p1", ProcessKind::Pool),
                ProcessRecord::new("clock", ProcessKind::Stepper),
            ],
            &[ConnectionRecord::new("c1", "s1", "p1")],
        )
        .unwrap()
    }

    #[test]
    fn batch_size_doubles_when_fast_and_halves_when_slow() {
        assert_eq!(next_batch_size(100, Duration::from_millis(10)), 200);
        assert_eq!(next_batch_size(100, Duration::from_millis(400)), 100);
        assert_eq!(next_batch_size(100, Duration::from_millis(2000)), 50);
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(next_batch_size(MAX_BATCH, Duration::from_millis(1)), MAX_BATCH);
        assert_eq!(next_batch_size(MIN_BATCH, Duration::from_secs(10)), MIN_BATCH);
        assert_eq!(next_batch_size(11, Duration::from_secs(10)), MIN_BATCH);
    }

    #[tokio::test]
    async fn dispatch_steps_and_reports_state() {
        let state = AppState::new(sim());
        let response = dispatch(&state, r#"{"type":"stepN","n":3}"#).await;
        match response {
            Response::Stepped { state, .. } => {
                assert_eq!(state.step, 3);
                assert_eq!(state.pool_resources("p1"), Some(3.0));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_rejects_malformed_json() {
        let state = AppState::new(sim());
        match dispatch(&state, "{").await {
            Response::Error { kind, .. } => assert_eq!(kind, "ParseError"),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_halts_the_run_loop_and_clears() {
        let state = AppState::new(sim());
        let _ = dispatch(&state, r#"{"type":"play","delay_ms":5}"#).await;
        assert!(state.run_loop.lock().await.is_some());

        let response = dispatch(&state, r#"{"type":"reset"}"#).await;
        assert_eq!(response, Response::Ok);
        assert!(state.run_loop.lock().await.is_none());
        assert_eq!(state.sim.lock().await.current_step(), 0);
    }

    #[tokio::test]
    async fn pause_without_play_is_harmless() {
        let state = AppState::new(sim());
        assert_eq!(dispatch(&state, r#"{"type":"pause"}"#).await, Response::Ok);
    }
}
