//! Simcraft WebAssembly bindings — browser worker bridge.
//!
//! Runs a simulation inside a web worker. The worker's JS shim forwards
//! each posted message to [`SimulationBridge::handle_message`] and posts
//! the returned response back to the page; both sides speak the tagged
//! message schema from `simcraft_core::protocol`.
//!
//! The `play` run loop is driven from the JS side: the shim calls
//! [`SimulationBridge::play_batch`] on a timer and posts each returned
//! `stateUpdate`. With a zero delay the bridge adapts its internal batch
//! size toward ~500 ms per update, clamped to [10, 50_000].

use wasm_bindgen::prelude::*;

use simcraft_core::protocol::{self, Response};
use simcraft_core::{Model, Simulation};

// ---------------------------------------------------------------------------
// Browser API helpers
// ---------------------------------------------------------------------------

/// Get `performance.now()` as f64 milliseconds.
fn performance_now() -> f64 {
    js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("performance"))
        .ok()
        .and_then(|perf| js_sys::Reflect::get(&perf, &JsValue::from_str("now")).ok())
        .and_then(|func| {
            let func: js_sys::Function = func.dyn_into().ok()?;
            func.call0(&js_sys::global().into()).ok()?.as_f64()
        })
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Batch adaptation
// ---------------------------------------------------------------------------

const MIN_BATCH: u64 = 10;
const MAX_BATCH: u64 = 50_000;
const TARGET_UPDATE_MS: f64 = 500.0;

/// Multiplicatively steer the batch size toward the target update latency.
fn next_batch_size(batch: u64, elapsed_ms: f64) -> u64 {
    let next = if elapsed_ms < TARGET_UPDATE_MS / 2.0 {
        batch.saturating_mul(2)
    } else if elapsed_ms > TARGET_UPDATE_MS * 1.5 {
        batch / 2
    } else {
        batch
    };
    next.clamp(MIN_BATCH, MAX_BATCH)
}

// ---------------------------------------------------------------------------
// The bridge
// ---------------------------------------------------------------------------

/// A simulation plus the run-loop batch state, owned by the worker.
#[wasm_bindgen]
pub struct SimulationBridge {
    sim: Simulation,
    batch: u64,
}

impl Default for SimulationBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl SimulationBridge {
    /// An empty simulation; load a model via a `loadModel` message.
    #[wasm_bindgen(constructor)]
    pub fn new() -> SimulationBridge {
        SimulationBridge {
            sim: Simulation::default(),
            batch: MIN_BATCH,
        }
    }

    /// Build a bridge directly from a YAML model.
    pub fn from_yaml(input: &str) -> Result<SimulationBridge, JsValue> {
        let model = Model::from_yaml(input).map_err(|err| JsValue::from_str(&err.to_string()))?;
        let sim =
            Simulation::from_model(&model).map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(SimulationBridge {
            sim,
            batch: MIN_BATCH,
        })
    }

    /// Handle one JSON request, returning the JSON response. `play` and
    /// `pause` belong to the JS-side timer; they answer with an error
    /// envelope here.
    pub fn handle_message(&mut self, request_json: &str) -> String {
        protocol::handle_json(&mut self.sim, request_json)
    }

    /// Run one adaptive batch of steps and return a `stateUpdate` message
    /// (or an error envelope if the run halted). The JS shim calls this in
    /// its `play` loop and posts each result.
    pub fn play_batch(&mut self, delay_ms: u32) -> String {
        let batch = if delay_ms == 0 { self.batch } else { 1 };
        let started = performance_now();
        let response = match self.sim.step_n(batch) {
            Ok(_) => Response::StateUpdate {
                state: self.sim.get_simulation_state(),
            },
            Err(halted) => Response::from_error(&halted.error),
        };
        if delay_ms == 0 {
            self.batch = next_batch_size(self.batch, performance_now() - started);
        }
        protocol::serialize_response(&response)
    }

    /// The current snapshot as a `state` message.
    pub fn state(&self) -> String {
        protocol::serialize_response(&Response::State {
            state: self.sim.get_simulation_state(),
        })
    }

    /// Kernel version.
    pub fn version() -> String {
        simcraft_core::VERSION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
processes:
  - id: s1
    type: Source
  - id: p1
    type: Pool
  - id: clock
    type: Stepper
connections:
  - id: c1
    sourceID: s1
    targetID: p1
"#;

    #[test]
    fn batch_size_adapts_toward_the_target() {
        assert_eq!(next_batch_size(100, 10.0), 200);
        assert_eq!(next_batch_size(100, 400.0), 100);
        assert_eq!(next_batch_size(100, 2000.0), 50);
        assert_eq!(next_batch_size(MAX_BATCH, 1.0), MAX_BATCH);
        assert_eq!(next_batch_size(MIN_BATCH, 9000.0), MIN_BATCH);
    }

    #[test]
    fn bridge_speaks_the_message_protocol() {
        let mut bridge = SimulationBridge::from_yaml(MODEL).unwrap();
        let raw = bridge.handle_message(r#"{"type":"stepN","n":4}"#);
        let response: Response = serde_json::from_str(&raw).unwrap();
        match response {
            Response::Stepped { state, .. } => {
                assert_eq!(state.step, 4);
                assert_eq!(state.pool_resources("p1"), Some(4.0));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn empty_bridge_accepts_load_model() {
        let mut bridge = SimulationBridge::new();
        let model = Model::from_yaml(MODEL).unwrap();
        let request = serde_json::json!({ "type": "loadModel", "model": model });
        let raw = bridge.handle_message(&request.to_string());
        let response: Response = serde_json::from_str(&raw).unwrap();
        assert!(matches!(response, Response::State { .. }));
    }

    #[test]
    fn bad_requests_get_error_envelopes() {
        let mut bridge = SimulationBridge::new();
        let raw = bridge.handle_message("not json");
        let response: Response = serde_json::from_str(&raw).unwrap();
        assert!(matches!(response, Response::Error { .. }));
    }
}
