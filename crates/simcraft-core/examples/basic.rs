//! Basic simulation run.
//!
//! Builds a faucet→tub model from the inline DSL, runs it for ten steps,
//! and prints the state after each step.
//!
//! Run: `cargo run --example basic`

use simcraft_core::{Model, Simulation};

fn main() {
    let model = Model::from_dsl(
        r#"
processes {
    source "faucet" {}
    pool "tub" { capacity: 6, overflow: Block }
    drain "overflow_pipe" { trigger_mode: Passive }
    stepper "clock" { dt: 1.0 }
}
connections {
    "faucet.out" -> "tub.in" { flow_rate: 1.5 }
}
"#,
    )
    .expect("model parses");

    let mut sim = Simulation::from_model(&model).expect("model installs");

    for _ in 0..10 {
        let delivered = sim.step().expect("step succeeds");
        let state = sim.get_simulation_state();
        println!(
            "t={:>4} tub={:>4} produced={:>4} ({} events)",
            state.time,
            state.pool_resources("tub").unwrap_or(0.0),
            state.source_produced("faucet").unwrap_or(0.0),
            delivered.len()
        );
    }
}
