//! # simcraft-core
//!
//! **A deterministic resource-flow simulation kernel.**
//!
//! `simcraft-core` runs discrete-event simulations of resource-flow models:
//! Sources produce resources, Pools accumulate them, Drains consume them,
//! Delays shape them over time, and a Stepper drives wall-clock-free
//! simulated time across a directed graph of weighted connections.
//!
//! ## Quick Start
//!
//! ```
//! use simcraft_core::{Model, Simulation};
//!
//! let model = Model::from_dsl(r#"
//!     processes {
//!         source "faucet" {}
//!         pool "tub" {}
//!         stepper "clock" {}
//!     }
//!     connections {
//!         "faucet.out" -> "tub.in" { flow_rate: 1.0 }
//!     }
//! "#).unwrap();
//!
//! let mut sim = Simulation::from_model(&model).unwrap();
//! sim.step_n(5).unwrap();
//!
//! let state = sim.get_simulation_state();
//! assert_eq!(state.time, 5.0);
//! assert_eq!(state.pool_resources("tub"), Some(5.0));
//! ```
//!
//! ## Architecture
//!
//! Model (YAML / inline DSL) → Simulation (processes + connections +
//! scheduler) → per-step event loop → Snapshot
//!
//! Every step ticks processes in registration order, buffers their
//! emissions through a `(time, seq)`-ordered scheduler, and drains all
//! events due at the current time in FIFO order. Given identical inputs and
//! identical edit/step sequences, two runs produce bit-identical event
//! streams and snapshots: there is no wall clock, no randomness, and no
//! iteration over unordered collections anywhere in the simulation path.
//!
//! Embeddings drive the kernel in-process through [`Simulation`], or
//! remotely through the tagged message schema in [`protocol`].

pub mod connection;
pub mod error;
pub mod event;
pub mod model;
pub mod process;
pub mod protocol;
pub mod scheduler;
pub mod simulation;
pub mod state;

pub use connection::{Connection, ConnectionRecord};
pub use error::{Halted, Result, SimulationError};
pub use event::{Event, Payload};
pub use model::Model;
pub use process::{
    Action, AsProcess, Overflow, Process, ProcessConfig, ProcessKind, ProcessRecord, TriggerMode,
};
pub use simulation::Simulation;
pub use state::{ProcessState, SimulationState};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
