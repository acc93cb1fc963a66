//! Drain: consumes resources arriving on its `in` port.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::event::{Event, Payload};
use crate::state::ProcessState;

use super::{
    Action, AsProcess, Delivery, ProcessConfig, ProcessContext, ProcessKind, ProcessRecord,
    TriggerMode,
};

/// Drain configuration. Push actions are accepted on the wire but a Drain
/// has no output to push on, so they fire as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrainConfig {
    pub trigger_mode: TriggerMode,
    pub action: Action,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::default(),
            action: Action::PullAny,
        }
    }
}

/// Unconditionally consumes inbound transfers; no capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct Drain {
    id: String,
    config: DrainConfig,
    resources_consumed: f64,
}

impl Drain {
    pub fn new(id: impl Into<String>, config: DrainConfig) -> Self {
        Self {
            id: id.into(),
            config,
            resources_consumed: 0.0,
        }
    }

    pub(crate) fn from_record(record: &ProcessRecord) -> Result<Self> {
        record.reject_foreign_fields(&["trigger_mode", "action"])?;
        let action = record.action.unwrap_or(Action::PullAny);
        if !action.is_pull() && !action.is_push() {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: action {action:?} is not valid for a Drain",
                record.id
            )));
        }
        Ok(Self::new(
            &record.id,
            DrainConfig {
                trigger_mode: record.trigger_mode.unwrap_or_default(),
                action,
            },
        ))
    }

    pub(crate) fn to_record(&self) -> ProcessRecord {
        let mut record = ProcessRecord::new(&self.id, ProcessKind::Drain);
        if self.config.trigger_mode != TriggerMode::Automatic {
            record.trigger_mode = Some(self.config.trigger_mode);
        }
        if self.config.action != Action::PullAny {
            record.action = Some(self.config.action);
        }
        record
    }

    /// Fire the configured pull once. Push actions do nothing here.
    fn fire(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        match self.config.action {
            Action::PullAny => ctx
                .inbound
                .iter()
                .filter_map(|view| {
                    let amount = view.flow_rate.min(view.peer_pullable);
                    (amount > 0.0).then(|| {
                        Event::pull_request(
                            &self.id,
                            &view.target_port,
                            &view.source_id,
                            &view.source_port,
                            ctx.time,
                            amount,
                        )
                    })
                })
                .collect(),
            Action::PullAll => {
                if ctx.inbound.is_empty()
                    || ctx
                        .inbound
                        .iter()
                        .any(|view| view.peer_pullable < view.flow_rate)
                {
                    return Vec::new();
                }
                ctx.inbound
                    .iter()
                    .map(|view| {
                        Event::pull_request(
                            &self.id,
                            &view.target_port,
                            &view.source_id,
                            &view.source_port,
                            ctx.time,
                            view.flow_rate,
                        )
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

impl AsProcess for Drain {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Drain
    }

    fn input_ports(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_ports(&self) -> &'static [&'static str] {
        &[]
    }

    fn config(&self) -> ProcessConfig {
        ProcessConfig::Drain(self.config)
    }

    fn state(&self) -> ProcessState {
        ProcessState::Drain {
            resources_consumed: self.resources_consumed,
        }
    }

    fn reset(&mut self) {
        self.resources_consumed = 0.0;
    }

    fn on_tick(&mut self, ctx: &ProcessContext) -> Result<Vec<Event>> {
        match self.config.trigger_mode {
            TriggerMode::Automatic => Ok(self.fire(ctx)),
            _ => Ok(Vec::new()),
        }
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Result<Delivery> {
        match event.payload {
            Payload::Transfer { amount } => {
                self.resources_consumed += amount;
                Ok(Delivery::accept(amount))
            }
            Payload::Trigger if self.config.trigger_mode == TriggerMode::Interactive => {
                Ok(Delivery::emit(self.fire(ctx)))
            }
            _ => Ok(Delivery::ignore()),
        }
    }

    fn update_config(&mut self, config: ProcessConfig) -> Result<()> {
        match config {
            ProcessConfig::Drain(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(SimulationError::InvalidTransition(format!(
                "process {:?}: cannot reconfigure a Drain as {}",
                self.id,
                other.kind()
            ))),
        }
    }
}
