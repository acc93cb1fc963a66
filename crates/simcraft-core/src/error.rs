//! Simulation error taxonomy.
//!
//! Every failure surfaced by the kernel, the process variants, or the model
//! loaders is one of the variants below. Each variant carries a
//! human-readable message and maps to a stable tag via [`SimulationError::kind`],
//! which embeddings translate into their native error shapes.

use thiserror::Error;

use crate::event::Event;

/// Errors produced by the kernel, loaders, and process variants.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A process or connection record has missing or conflicting fields, or
    /// an action that is not valid for its kind.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A process or connection id already exists in the simulation.
    #[error("duplicate id {0:?}")]
    DuplicateId(String),

    /// A referenced process or connection id does not exist.
    #[error("unknown id {0:?}")]
    UnknownId(String),

    /// A port name is not declared by the referenced process kind.
    #[error("unknown port {port:?} on process {process:?}")]
    PortUnknown { process: String, port: String },

    /// A Pool with the Block policy refused part of an inbound transfer.
    /// Normally an in-band result reflected in the cumulative counters,
    /// never raised by the event loop itself.
    #[error("capacity exceeded on {process:?}: {refused} refused")]
    CapacityExceeded { process: String, refused: f64 },

    /// A process refused a configuration update it cannot apply.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The per-tick event budget was exhausted; the step was rolled back.
    #[error("cascade overflow at step {step}: more than {budget} events in one tick")]
    CascadeOverflow { step: u64, budget: usize },

    /// The declarative surface rejected the input.
    #[error("parse error: {0}")]
    ParseError(String),
}

impl SimulationError {
    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::DuplicateId(_) => "DuplicateId",
            Self::UnknownId(_) => "UnknownId",
            Self::PortUnknown { .. } => "PortUnknown",
            Self::CapacityExceeded { .. } => "CapacityExceeded",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::CascadeOverflow { .. } => "CascadeOverflow",
            Self::ParseError(_) => "ParseError",
        }
    }
}

impl From<serde_yaml::Error> for SimulationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<serde_json::Error> for SimulationError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Failure from a multi-step run ([`step_n`]/[`step_until`]): the failing
/// step rolled back, every earlier step remains applied.
///
/// [`step_n`]: crate::simulation::Simulation::step_n
/// [`step_until`]: crate::simulation::Simulation::step_until
#[derive(Debug, Error)]
#[error("halted after {completed} steps: {error}")]
pub struct Halted {
    /// Steps that completed before the failure.
    pub completed: u64,
    /// Events delivered by the completed steps, in delivery order.
    pub events: Vec<Event>,
    /// The error that stopped the run.
    #[source]
    pub error: SimulationError,
}

pub type Result<T> = std::result::Result<T, SimulationError>;
