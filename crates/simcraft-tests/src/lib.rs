//! Model invariant check battery.
//!
//! Deterministic model-level checks of the simulation contract: run a model
//! for a number of steps and verify determinism, conservation,
//! monotonicity, pool bounds, reset idempotence, and loader round-trips.
//! Each check returns a [`CheckResult`] with a pass/fail determination and
//! a human-readable detail line. The CLI `check` command runs the whole
//! battery over a model file.

use simcraft_core::{Model, ProcessKind, ProcessState, Simulation, SimulationState};

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a single invariant check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

impl CheckResult {
    fn pass(name: &str, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            details: details.into(),
        }
    }

    fn fail(name: &str, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            details: details.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Build a simulation, mapping install failures into a failing result.
fn build(name: &str, model: &Model) -> Result<Simulation, CheckResult> {
    Simulation::from_model(model)
        .map_err(|err| CheckResult::fail(name, format!("model does not install: {err}")))
}

/// Step once, mapping failures into a failing result.
fn step(name: &str, sim: &mut Simulation) -> Result<(), CheckResult> {
    sim.step()
        .map(|_| ())
        .map_err(|err| CheckResult::fail(name, format!("step {} failed: {err}", sim.current_step() + 1)))
}

/// Cumulative counters of one snapshot, in key order: the values that must
/// never decrease.
fn counters(state: &SimulationState) -> Vec<(String, f64)> {
    let mut values = vec![
        ("time".to_string(), state.time),
        ("step".to_string(), state.step as f64),
    ];
    for (id, process_state) in &state.process_states {
        match process_state {
            ProcessState::Source { resources_produced } => {
                values.push((format!("{id}.produced"), *resources_produced));
            }
            ProcessState::Drain { resources_consumed } => {
                values.push((format!("{id}.consumed"), *resources_consumed));
            }
            ProcessState::Delay {
                resources_received,
                resources_released,
            } => {
                values.push((format!("{id}.received"), *resources_received));
                values.push((format!("{id}.released"), *resources_released));
            }
            ProcessState::Stepper { current_step } => {
                values.push((format!("{id}.step"), *current_step as f64));
            }
            ProcessState::Pool { .. } => {}
        }
    }
    values
}

// ═══════════════════════════════════════════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════════════════════════════════════════

/// Two independent runs yield identical event streams and snapshots.
pub fn check_determinism(model: &Model, steps: u64) -> CheckResult {
    const NAME: &str = "determinism";
    let run = || -> Result<(String, SimulationState), CheckResult> {
        let mut sim = build(NAME, model)?;
        let events = sim
            .step_n(steps)
            .map_err(|err| CheckResult::fail(NAME, format!("run halted: {err}")))?;
        let events_json = serde_json::to_string(&events)
            .map_err(|err| CheckResult::fail(NAME, format!("event stream does not serialize: {err}")))?;
        Ok((events_json, sim.get_simulation_state()))
    };
    let (events_a, state_a) = match run() {
        Ok(outcome) => outcome,
        Err(result) => return result,
    };
    let (events_b, state_b) = match run() {
        Ok(outcome) => outcome,
        Err(result) => return result,
    };
    if events_a != events_b {
        return CheckResult::fail(NAME, "two runs delivered different event streams");
    }
    if state_a != state_b {
        return CheckResult::fail(NAME, "two runs ended in different states");
    }
    CheckResult::pass(NAME, format!("{steps} steps replay bit-identically"))
}

/// Without Drains, Delays, or capacities, everything produced is pooled.
pub fn check_conservation(model: &Model, steps: u64) -> CheckResult {
    const NAME: &str = "conservation";
    let lossy = model.processes.iter().any(|record| {
        matches!(record.kind, ProcessKind::Drain | ProcessKind::Delay)
            || record.capacity.is_some()
    });
    if lossy {
        return CheckResult::pass(
            NAME,
            "not applicable: model has drains, delays, or capacities",
        );
    }
    let mut sim = match build(NAME, model) {
        Ok(sim) => sim,
        Err(result) => return result,
    };
    for _ in 0..steps {
        if let Err(result) = step(NAME, &mut sim) {
            return result;
        }
        let state = sim.get_simulation_state();
        let mut produced = 0.0;
        let mut pooled = 0.0;
        for process_state in state.process_states.values() {
            match process_state {
                ProcessState::Source { resources_produced } => produced += resources_produced,
                ProcessState::Pool { resources } => pooled += resources,
                _ => {}
            }
        }
        if produced != pooled {
            return CheckResult::fail(
                NAME,
                format!(
                    "step {}: produced {produced} but pooled {pooled}",
                    state.step
                ),
            );
        }
    }
    CheckResult::pass(NAME, format!("production equals pooling across {steps} steps"))
}

/// Cumulative counters never decrease.
pub fn check_monotonicity(model: &Model, steps: u64) -> CheckResult {
    const NAME: &str = "monotonicity";
    let mut sim = match build(NAME, model) {
        Ok(sim) => sim,
        Err(result) => return result,
    };
    let mut previous = counters(&sim.get_simulation_state());
    for _ in 0..steps {
        if let Err(result) = step(NAME, &mut sim) {
            return result;
        }
        let current = counters(&sim.get_simulation_state());
        for ((name, before), (_, after)) in previous.iter().zip(current.iter()) {
            if after < before {
                return CheckResult::fail(
                    NAME,
                    format!("counter {name} decreased from {before} to {after}"),
                );
            }
        }
        previous = current;
    }
    CheckResult::pass(NAME, format!("all counters non-decreasing over {steps} steps"))
}

/// Every Pool stays within `[0, capacity]` after every step.
pub fn check_pool_bounds(model: &Model, steps: u64) -> CheckResult {
    const NAME: &str = "pool-bounds";
    let capacities: Vec<(String, Option<f64>)> = model
        .processes
        .iter()
        .filter(|record| record.kind == ProcessKind::Pool)
        .map(|record| (record.id.clone(), record.capacity))
        .collect();
    if capacities.is_empty() {
        return CheckResult::pass(NAME, "not applicable: model has no pools");
    }
    let mut sim = match build(NAME, model) {
        Ok(sim) => sim,
        Err(result) => return result,
    };
    for _ in 0..steps {
        if let Err(result) = step(NAME, &mut sim) {
            return result;
        }
        let state = sim.get_simulation_state();
        for (id, capacity) in &capacities {
            let Some(resources) = state.pool_resources(id) else {
                return CheckResult::fail(NAME, format!("pool {id} missing from snapshot"));
            };
            if resources < 0.0 {
                return CheckResult::fail(
                    NAME,
                    format!("step {}: pool {id} went negative ({resources})", state.step),
                );
            }
            if let Some(capacity) = capacity {
                if resources > *capacity {
                    return CheckResult::fail(
                        NAME,
                        format!(
                            "step {}: pool {id} holds {resources}, over capacity {capacity}",
                            state.step
                        ),
                    );
                }
            }
        }
    }
    CheckResult::pass(
        NAME,
        format!("{} pools stay within bounds over {steps} steps", capacities.len()),
    )
}

/// `reset()` followed by a re-run matches a fresh simulation step for step.
pub fn check_reset_idempotence(model: &Model, steps: u64) -> CheckResult {
    const NAME: &str = "reset-idempotence";
    let trajectory = |sim: &mut Simulation| -> Result<Vec<SimulationState>, CheckResult> {
        let mut states = Vec::new();
        for _ in 0..steps {
            step(NAME, sim)?;
            states.push(sim.get_simulation_state());
        }
        Ok(states)
    };

    let mut sim = match build(NAME, model) {
        Ok(sim) => sim,
        Err(result) => return result,
    };
    let first = match trajectory(&mut sim) {
        Ok(states) => states,
        Err(result) => return result,
    };
    sim.reset();
    let replay = match trajectory(&mut sim) {
        Ok(states) => states,
        Err(result) => return result,
    };
    if first != replay {
        return CheckResult::fail(NAME, "trajectory after reset diverged from the first run");
    }
    CheckResult::pass(NAME, format!("reset replays {steps} steps identically"))
}

/// Serializing to YAML and parsing back yields an equivalent kernel input.
pub fn check_yaml_round_trip(model: &Model) -> CheckResult {
    const NAME: &str = "yaml-round-trip";
    let yaml = match model.to_yaml() {
        Ok(yaml) => yaml,
        Err(err) => return CheckResult::fail(NAME, format!("model does not serialize: {err}")),
    };
    let reparsed = match Model::from_yaml(&yaml) {
        Ok(model) => model,
        Err(err) => return CheckResult::fail(NAME, format!("serialized YAML does not parse: {err}")),
    };
    let original = match build(NAME, model) {
        Ok(sim) => sim,
        Err(result) => return result,
    };
    let round_tripped = match build(NAME, &reparsed) {
        Ok(sim) => sim,
        Err(result) => return result,
    };
    if original.processes() != round_tripped.processes()
        || original.connections() != round_tripped.connections()
    {
        return CheckResult::fail(NAME, "round-tripped model lowers to different kernel inputs");
    }
    CheckResult::pass(NAME, "YAML round-trip preserves the kernel input")
}

// ═══════════════════════════════════════════════════════════════════════════════
// Battery
// ═══════════════════════════════════════════════════════════════════════════════

/// Run the full battery over a model.
pub fn run_all_checks(model: &Model, steps: u64) -> Vec<CheckResult> {
    vec![
        check_determinism(model, steps),
        check_conservation(model, steps),
        check_monotonicity(model, steps),
        check_pool_bounds(model, steps),
        check_reset_idempotence(model, steps),
        check_yaml_round_trip(model),
    ]
}

/// Whether every result in a battery passed.
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|result| result.passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faucet_model() -> Model {
        Model::from_dsl(
            r#"
processes {
    source "faucet" {}
    pool "tub" {}
    stepper "clock" {}
}
connections {
    "faucet.out" -> "tub.in" {}
}
"#,
        )
        .unwrap()
    }

    fn lossy_model() -> Model {
        Model::from_dsl(
            r#"
processes {
    source "s" {}
    delay "d" {}
    pool "p" { capacity: 4, overflow: Drain }
    stepper "clock" {}
}
connections {
    "s.out" -> "d.in" {}
    "d.out" -> "p.in" { flow_rate: 2.0 }
}
"#,
        )
        .unwrap()
    }

    #[test]
    fn battery_passes_on_a_simple_model() {
        let results = run_all_checks(&faucet_model(), 10);
        for result in &results {
            assert!(result.passed, "{}: {}", result.name, result.details);
        }
        assert!(all_passed(&results));
    }

    #[test]
    fn battery_passes_on_a_lossy_model() {
        let results = run_all_checks(&lossy_model(), 15);
        for result in &results {
            assert!(result.passed, "{}: {}", result.name, result.details);
        }
    }

    #[test]
    fn conservation_skips_lossy_models() {
        let result = check_conservation(&lossy_model(), 5);
        assert!(result.passed);
        assert!(result.details.contains("not applicable"));
    }

    #[test]
    fn broken_models_fail_instead_of_panicking() {
        let mut model = faucet_model();
        model.connections[0].target_id = "ghost".into();
        let result = check_determinism(&model, 5);
        assert!(!result.passed);
        assert!(result.details.contains("does not install"));
    }
}
