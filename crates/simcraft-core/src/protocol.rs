//! Request/response protocol for remote transports.
//!
//! The worker bridge, the socket transport, and plain HTTP all speak the
//! same tagged JSON messages, defined once here so the schemas cannot
//! drift. Request types correspond one-to-one with the kernel API; `play`
//! and `pause` belong to the transport's run loop and are intercepted
//! before [`apply`].

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionRecord;
use crate::error::{Halted, SimulationError};
use crate::event::Event;
use crate::model::Model;
use crate::process::ProcessRecord;
use crate::simulation::Simulation;
use crate::state::SimulationState;

/// A kernel request, e.g. `{"type": "stepN", "n": 10}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Step,
    StepN { n: u64 },
    StepUntil { time: f64 },
    Reset,
    GetState,
    AddProcess { process: ProcessRecord },
    RemoveProcess { id: String },
    UpdateProcess { id: String, process: ProcessRecord },
    AddConnection { connection: ConnectionRecord },
    RemoveConnection { id: String },
    UpdateConnection { id: String, connection: ConnectionRecord },
    Inject { event: Event },
    /// Replace the simulation with a freshly loaded model.
    LoadModel { model: Model },
    /// Start a background run loop; one `stateUpdate` is pushed per update.
    /// Handled by the transport, not by [`apply`].
    Play { delay_ms: u64 },
    /// Halt the background run loop. Handled by the transport.
    Pause,
}

/// A kernel response or asynchronous push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Steps ran: the delivered events plus the resulting snapshot.
    Stepped {
        events: Vec<Event>,
        state: SimulationState,
    },
    /// A snapshot, answering `getState` or `loadModel`.
    State { state: SimulationState },
    /// A structural edit or control request succeeded.
    Ok,
    /// Asynchronous snapshot push while a run loop is active.
    StateUpdate { state: SimulationState },
    Error { error: String, kind: String },
}

impl Response {
    pub fn from_error(error: &SimulationError) -> Self {
        Self::Error {
            error: error.to_string(),
            kind: error.kind().to_string(),
        }
    }

    fn from_halted(halted: &Halted) -> Self {
        Self::Error {
            error: halted.to_string(),
            kind: halted.error.kind().to_string(),
        }
    }
}

fn ack(result: crate::error::Result<()>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(err) => Response::from_error(&err),
    }
}

fn stepped(
    sim: &Simulation,
    outcome: std::result::Result<Vec<Event>, Halted>,
) -> Response {
    match outcome {
        Ok(events) => Response::Stepped {
            events,
            state: sim.get_simulation_state(),
        },
        Err(halted) => Response::from_halted(&halted),
    }
}

/// Apply one request to a simulation. `play`/`pause` yield an error here;
/// transports intercept them first.
pub fn apply(sim: &mut Simulation, request: Request) -> Response {
    match request {
        Request::Step => match sim.step() {
            Ok(events) => Response::Stepped {
                events,
                state: sim.get_simulation_state(),
            },
            Err(err) => Response::from_error(&err),
        },
        Request::StepN { n } => {
            let outcome = sim.step_n(n);
            stepped(sim, outcome)
        }
        Request::StepUntil { time } => {
            let outcome = sim.step_until(time);
            stepped(sim, outcome)
        }
        Request::Reset => {
            sim.reset();
            Response::Ok
        }
        Request::GetState => Response::State {
            state: sim.get_simulation_state(),
        },
        Request::AddProcess { process } => ack(sim.add_process(&process)),
        Request::RemoveProcess { id } => ack(sim.remove_process(&id)),
        Request::UpdateProcess { id, process } => ack(sim.update_process(&id, &process)),
        Request::AddConnection { connection } => ack(sim.add_connection(&connection)),
        Request::RemoveConnection { id } => ack(sim.remove_connection(&id)),
        Request::UpdateConnection { id, connection } => {
            ack(sim.update_connection(&id, &connection))
        }
        Request::Inject { event } => ack(sim.inject(event)),
        Request::LoadModel { model } => match Simulation::from_model(&model) {
            Ok(loaded) => {
                *sim = loaded;
                Response::State {
                    state: sim.get_simulation_state(),
                }
            }
            Err(err) => Response::from_error(&err),
        },
        Request::Play { .. } | Request::Pause => Response::Error {
            error: "play/pause are handled by the transport run loop".into(),
            kind: "InvalidConfig".into(),
        },
    }
}

/// Handle one JSON-encoded request, returning the JSON-encoded response.
pub fn handle_json(sim: &mut Simulation, request_json: &str) -> String {
    let response = match serde_json::from_str::<Request>(request_json) {
        Ok(request) => apply(sim, request),
        Err(err) => Response::Error {
            error: err.to_string(),
            kind: "ParseError".into(),
        },
    };
    serialize_response(&response)
}

/// Encode a response, falling back to a hand-built error envelope if the
/// response itself will not serialize.
pub fn serialize_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        format!(r#"{{"type":"error","error":"response serialization failed: {err}","kind":"ParseError"}}"#)
    })
}
