//! Immutable simulation state snapshots.
//!
//! Snapshots are value copies assembled by the kernel; no shared mutable
//! state crosses the boundary to callers. `process_states` is a `BTreeMap`
//! so serialized snapshots are byte-stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Variant-tagged per-process state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProcessState {
    /// Cumulative total accepted by downstream targets.
    Source { resources_produced: f64 },
    /// Current level.
    Pool { resources: f64 },
    /// Cumulative total consumed.
    Drain { resources_consumed: f64 },
    /// Cumulative totals; in-flight amount is `received − released`.
    Delay {
        resources_received: f64,
        resources_released: f64,
    },
    /// Mirrors the kernel step counter.
    Stepper { current_step: u64 },
}

/// Global time and step plus every process's state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub time: f64,
    pub step: u64,
    pub process_states: BTreeMap<String, ProcessState>,
}

impl SimulationState {
    /// Pool level by process id, if that process is a Pool.
    pub fn pool_resources(&self, id: &str) -> Option<f64> {
        match self.process_states.get(id) {
            Some(ProcessState::Pool { resources }) => Some(*resources),
            _ => None,
        }
    }

    /// Source cumulative production by process id.
    pub fn source_produced(&self, id: &str) -> Option<f64> {
        match self.process_states.get(id) {
            Some(ProcessState::Source { resources_produced }) => Some(*resources_produced),
            _ => None,
        }
    }

    /// Drain cumulative consumption by process id.
    pub fn drain_consumed(&self, id: &str) -> Option<f64> {
        match self.process_states.get(id) {
            Some(ProcessState::Drain { resources_consumed }) => Some(*resources_consumed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_is_key_sorted() {
        let mut process_states = BTreeMap::new();
        process_states.insert("b".to_string(), ProcessState::Pool { resources: 1.0 });
        process_states.insert(
            "a".to_string(),
            ProcessState::Source {
                resources_produced: 2.0,
            },
        );
        let state = SimulationState {
            time: 1.0,
            step: 1,
            process_states,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.find("\"a\"").unwrap() < json.find("\"b\"").unwrap());
    }

    #[test]
    fn accessors_check_the_variant() {
        let mut process_states = BTreeMap::new();
        process_states.insert("p".to_string(), ProcessState::Pool { resources: 3.0 });
        let state = SimulationState {
            time: 0.0,
            step: 0,
            process_states,
        };
        assert_eq!(state.pool_resources("p"), Some(3.0));
        assert_eq!(state.source_produced("p"), None);
        assert_eq!(state.drain_consumed("missing"), None);
    }
}
