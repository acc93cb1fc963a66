use simcraft_core::Simulation;

/// Run a model for a number of steps (or until a target time), printing the
/// trajectory and final state.
pub fn run(
    path: &str,
    steps: u64,
    until: Option<f64>,
    trace: bool,
    events: bool,
    output: Option<&str>,
) {
    let mut sim = super::load_simulation(path);

    let failed = match until {
        Some(target_time) => run_until(&mut sim, target_time, trace, events),
        None => run_steps(&mut sim, steps, trace, events),
    };

    let state = sim.get_simulation_state();
    println!();
    super::print_state(&state);

    if let Some(output) = output {
        match serde_json::to_string_pretty(&state) {
            Ok(json) => {
                if let Err(err) = std::fs::write(output, json) {
                    eprintln!("error: cannot write {output}: {err}");
                    std::process::exit(1);
                }
                println!("\nSnapshot written to {output}");
            }
            Err(err) => {
                eprintln!("error: snapshot does not serialize: {err}");
                std::process::exit(1);
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

fn run_steps(sim: &mut Simulation, steps: u64, trace: bool, events: bool) -> bool {
    for _ in 0..steps {
        if !run_one(sim, trace, events) {
            return true;
        }
    }
    false
}

fn run_until(sim: &mut Simulation, target_time: f64, trace: bool, events: bool) -> bool {
    while sim.current_time() < target_time {
        if !run_one(sim, trace, events) {
            return true;
        }
    }
    false
}

fn run_one(sim: &mut Simulation, trace: bool, events: bool) -> bool {
    match sim.step() {
        Ok(delivered) => {
            if events {
                for event in &delivered {
                    match serde_json::to_string(event) {
                        Ok(json) => println!("{json}"),
                        Err(err) => eprintln!("error: event does not serialize: {err}"),
                    }
                }
            }
            if trace {
                match serde_json::to_string(&sim.get_simulation_state()) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("error: snapshot does not serialize: {err}"),
                }
            }
            true
        }
        Err(err) => {
            eprintln!(
                "error: step {} failed: {err}",
                sim.current_step() + 1
            );
            false
        }
    }
}
