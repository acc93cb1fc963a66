pub mod check;
pub mod run;
pub mod serve;
pub mod show;

use simcraft_core::{Model, ProcessState, Simulation, SimulationState};

/// Load a model file, exiting with a message on failure.
pub fn load_model(path: &str) -> Model {
    match Model::load(path) {
        Ok(model) => model,
        Err(err) => exit_with(&err.to_string()),
    }
}

/// Load a model file and install it into a simulation.
pub fn load_simulation(path: &str) -> Simulation {
    let model = load_model(path);
    match Simulation::from_model(&model) {
        Ok(sim) => sim,
        Err(err) => exit_with(&format!("{path}: {err}")),
    }
}

fn exit_with(message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

/// One aligned line per process for the state table.
pub fn format_process_line(id: &str, state: &ProcessState) -> String {
    match state {
        ProcessState::Source { resources_produced } => {
            format!("  {id:<20} Source   produced={resources_produced}")
        }
        ProcessState::Pool { resources } => {
            format!("  {id:<20} Pool     resources={resources}")
        }
        ProcessState::Drain { resources_consumed } => {
            format!("  {id:<20} Drain    consumed={resources_consumed}")
        }
        ProcessState::Delay {
            resources_received,
            resources_released,
        } => format!(
            "  {id:<20} Delay    received={resources_received} released={resources_released} in_flight={}",
            resources_received - resources_released
        ),
        ProcessState::Stepper { current_step } => {
            format!("  {id:<20} Stepper  step={current_step}")
        }
    }
}

/// Print the full state table.
pub fn print_state(state: &SimulationState) {
    println!("t={} step={}", state.time, state.step);
    for (id, process_state) in &state.process_states {
        println!("{}", format_process_line(id, process_state));
    }
}
