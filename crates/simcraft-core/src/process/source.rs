//! Source: produces resources on its `out` port.

use serde::{Deserialize, Serialize};

use crate::connection::DEFAULT_OUTPUT_PORT;
use crate::error::{Result, SimulationError};
use crate::event::{Event, Payload};
use crate::state::ProcessState;

use super::{
    Action, AsProcess, Delivery, ProcessConfig, ProcessContext, ProcessKind, ProcessRecord,
    TriggerMode,
};

/// Source configuration. The only implemented action is `PushAny`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub trigger_mode: TriggerMode,
}

/// Produces `flow_rate` units per firing on each outgoing connection.
/// `resources_produced` counts only amounts accepted downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    id: String,
    config: SourceConfig,
    resources_produced: f64,
}

impl Source {
    pub fn new(id: impl Into<String>, config: SourceConfig) -> Self {
        Self {
            id: id.into(),
            config,
            resources_produced: 0.0,
        }
    }

    pub(crate) fn from_record(record: &ProcessRecord) -> Result<Self> {
        record.reject_foreign_fields(&["trigger_mode", "action"])?;
        if let Some(action) = record.action {
            if action != Action::PushAny {
                return Err(SimulationError::InvalidConfig(format!(
                    "process {:?}: Source supports only the PushAny action, got {action:?}",
                    record.id
                )));
            }
        }
        Ok(Self::new(
            &record.id,
            SourceConfig {
                trigger_mode: record.trigger_mode.unwrap_or_default(),
            },
        ))
    }

    pub(crate) fn to_record(&self) -> ProcessRecord {
        let mut record = ProcessRecord::new(&self.id, ProcessKind::Source);
        if self.config.trigger_mode != TriggerMode::Automatic {
            record.trigger_mode = Some(self.config.trigger_mode);
        }
        record
    }

    /// One independent transfer per outgoing connection (PushAny).
    fn push_transfers(&self, ctx: &ProcessContext) -> Vec<Event> {
        ctx.outbound
            .iter()
            .map(|view| {
                Event::transfer(
                    &self.id,
                    &view.source_port,
                    &view.target_id,
                    &view.target_port,
                    ctx.time,
                    view.flow_rate,
                )
            })
            .collect()
    }

    /// Whether this source supplies on demand rather than on its own tick.
    fn answers_pulls(&self) -> bool {
        matches!(
            self.config.trigger_mode,
            TriggerMode::Passive | TriggerMode::Enabling
        )
    }
}

impl AsProcess for Source {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Source
    }

    fn input_ports(&self) -> &'static [&'static str] {
        &[]
    }

    fn output_ports(&self) -> &'static [&'static str] {
        &[DEFAULT_OUTPUT_PORT]
    }

    fn config(&self) -> ProcessConfig {
        ProcessConfig::Source(self.config)
    }

    fn state(&self) -> ProcessState {
        ProcessState::Source {
            resources_produced: self.resources_produced,
        }
    }

    fn reset(&mut self) {
        self.resources_produced = 0.0;
    }

    fn on_tick(&mut self, ctx: &ProcessContext) -> Result<Vec<Event>> {
        match self.config.trigger_mode {
            TriggerMode::Automatic => Ok(self.push_transfers(ctx)),
            _ => Ok(Vec::new()),
        }
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Result<Delivery> {
        match event.payload {
            // A downstream pull: supply the requested amount on demand.
            Payload::PullRequest { amount } if self.answers_pulls() => {
                let source_port = event
                    .target_port
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OUTPUT_PORT.to_string());
                let target_port = event.source_port.clone().unwrap_or_default();
                Ok(Delivery::emit(vec![Event::transfer(
                    &self.id,
                    source_port,
                    &event.source_id,
                    target_port,
                    ctx.time,
                    amount,
                )]))
            }
            // An external command fires an Interactive source once.
            Payload::Trigger if self.config.trigger_mode == TriggerMode::Interactive => {
                Ok(Delivery::emit(self.push_transfers(ctx)))
            }
            _ => Ok(Delivery::ignore()),
        }
    }

    fn on_receipt(&mut self, event: &Event, accepted: f64) {
        if matches!(event.payload, Payload::Transfer { .. }) {
            self.resources_produced += accepted;
        }
    }

    fn pullable(&self, _port: &str) -> f64 {
        if self.answers_pulls() {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn update_config(&mut self, config: ProcessConfig) -> Result<()> {
        match config {
            ProcessConfig::Source(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(SimulationError::InvalidTransition(format!(
                "process {:?}: cannot reconfigure a Source as {}",
                self.id,
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ConnectionView;

    fn ctx_with_outbound(targets: &[(&str, f64)]) -> ProcessContext {
        ProcessContext {
            time: 1.0,
            step: 1,
            inbound: Vec::new(),
            outbound: targets
                .iter()
                .map(|(target, rate)| ConnectionView {
                    id: format!("c-{target}"),
                    source_id: "s1".into(),
                    source_port: "out".into(),
                    target_id: (*target).into(),
                    target_port: "in".into(),
                    flow_rate: *rate,
                    peer_pullable: 0.0,
                    peer_headroom: f64::INFINITY,
                })
                .collect(),
        }
    }

    #[test]
    fn automatic_source_pushes_every_outgoing_connection() {
        let mut source = Source::new("s1", SourceConfig::default());
        let ctx = ctx_with_outbound(&[("a", 1.0), ("b", 2.0)]);
        let events = source.on_tick(&ctx).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].amount(), 1.0);
        assert_eq!(events[1].amount(), 2.0);
        assert_eq!(events[1].target_id, "b");
    }

    #[test]
    fn passive_source_is_silent_on_tick_but_answers_pulls() {
        let mut source = Source::new(
            "s1",
            SourceConfig {
                trigger_mode: TriggerMode::Passive,
            },
        );
        let ctx = ctx_with_outbound(&[("a", 1.0)]);
        assert!(source.on_tick(&ctx).unwrap().is_empty());
        assert_eq!(source.pullable("out"), f64::INFINITY);

        let pull = Event::pull_request("pool1", "in", "s1", "out", 1.0, 3.0);
        let delivery = source.on_message(&pull, &ctx).unwrap();
        assert_eq!(delivery.emitted.len(), 1);
        assert_eq!(delivery.emitted[0].amount(), 3.0);
        assert_eq!(delivery.emitted[0].target_id, "pool1");
    }

    #[test]
    fn automatic_source_ignores_pulls() {
        let mut source = Source::new("s1", SourceConfig::default());
        let ctx = ctx_with_outbound(&[("a", 1.0)]);
        let pull = Event::pull_request("pool1", "in", "s1", "out", 1.0, 3.0);
        let delivery = source.on_message(&pull, &ctx).unwrap();
        assert!(delivery.emitted.is_empty());
        assert_eq!(source.pullable("out"), 0.0);
    }

    #[test]
    fn produced_counts_only_accepted_amounts() {
        let mut source = Source::new("s1", SourceConfig::default());
        let ctx = ctx_with_outbound(&[("a", 1.0)]);
        let events = source.on_tick(&ctx).unwrap();
        source.on_receipt(&events[0], 0.25);
        match source.state() {
            ProcessState::Source { resources_produced } => {
                assert_eq!(resources_produced, 0.25)
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn interactive_source_fires_only_on_trigger() {
        let mut source = Source::new(
            "s1",
            SourceConfig {
                trigger_mode: TriggerMode::Interactive,
            },
        );
        let ctx = ctx_with_outbound(&[("a", 1.0)]);
        assert!(source.on_tick(&ctx).unwrap().is_empty());

        let trigger = Event {
            source_id: "external".into(),
            source_port: None,
            target_id: "s1".into(),
            target_port: None,
            time: 1.0,
            payload: Payload::Trigger,
        };
        let delivery = source.on_message(&trigger, &ctx).unwrap();
        assert_eq!(delivery.emitted.len(), 1);
    }
}
