//! Delay: buffers resources for a time before emitting them.
//!
//! The delay period is encoded by the outgoing connection's `flow_rate`:
//! a weight of `k` means `k` simulated time units between receipt and
//! release. Releases refused downstream are dropped, so
//! `resources_released` counts emitted amounts and `received − released`
//! is always the true in-flight quantity.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::event::{Event, Payload};
use crate::state::ProcessState;

use super::{
    Action, AsProcess, Delivery, ProcessConfig, ProcessContext, ProcessKind, ProcessRecord,
    TriggerMode,
};

/// Delay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub trigger_mode: TriggerMode,
    /// `Delay` (per-unit independent delay) or `Queue` (batched release).
    pub action: Action,
    /// Amount emitted per queue release.
    pub release_amount: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::default(),
            action: Action::Delay,
            release_amount: 1.0,
        }
    }
}

/// Time-shifts inbound transfers onto its outgoing connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    id: String,
    config: DelayConfig,
    resources_received: f64,
    resources_released: f64,
    /// Queue-mode buffer awaiting release.
    buffered: f64,
    /// Whether a queue release is already scheduled.
    release_pending: bool,
}

impl Delay {
    pub fn new(id: impl Into<String>, config: DelayConfig) -> Self {
        Self {
            id: id.into(),
            config,
            resources_received: 0.0,
            resources_released: 0.0,
            buffered: 0.0,
            release_pending: false,
        }
    }

    pub(crate) fn from_record(record: &ProcessRecord) -> Result<Self> {
        record.reject_foreign_fields(&["trigger_mode", "action", "release_amount"])?;
        let action = record.action.unwrap_or(Action::Delay);
        if !matches!(action, Action::Delay | Action::Queue) {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: action {action:?} is not valid for a Delay",
                record.id
            )));
        }
        let release_amount = record.release_amount.unwrap_or(1.0);
        if !release_amount.is_finite() || release_amount <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: release_amount must be a positive real, got {release_amount}",
                record.id
            )));
        }
        Ok(Self::new(
            &record.id,
            DelayConfig {
                trigger_mode: record.trigger_mode.unwrap_or_default(),
                action,
                release_amount,
            },
        ))
    }

    pub(crate) fn to_record(&self) -> ProcessRecord {
        let mut record = ProcessRecord::new(&self.id, ProcessKind::Delay);
        if self.config.trigger_mode != TriggerMode::Automatic {
            record.trigger_mode = Some(self.config.trigger_mode);
        }
        if self.config.action != Action::Delay {
            record.action = Some(self.config.action);
        }
        if self.config.release_amount != 1.0 {
            record.release_amount = Some(self.config.release_amount);
        }
        record
    }

    /// A self-addressed marker that fires the next queue release.
    fn release_marker(&self, time: f64) -> Event {
        Event {
            source_id: self.id.clone(),
            source_port: None,
            target_id: self.id.clone(),
            target_port: None,
            time,
            payload: Payload::Release,
        }
    }

    /// Pop one queue release if the buffer covers it; re-arm while it still
    /// does.
    fn fire_release(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        let Some(view) = ctx.outbound.first() else {
            self.release_pending = false;
            return Vec::new();
        };
        if self.buffered < self.config.release_amount {
            self.release_pending = false;
            return Vec::new();
        }
        self.buffered -= self.config.release_amount;
        let mut events = vec![Event::transfer(
            &self.id,
            &view.source_port,
            &view.target_id,
            &view.target_port,
            ctx.time,
            self.config.release_amount,
        )];
        if self.buffered >= self.config.release_amount {
            events.push(self.release_marker(ctx.time + view.flow_rate));
        } else {
            self.release_pending = false;
        }
        events
    }
}

impl AsProcess for Delay {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Delay
    }

    fn input_ports(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_ports(&self) -> &'static [&'static str] {
        &["out"]
    }

    fn config(&self) -> ProcessConfig {
        ProcessConfig::Delay(self.config)
    }

    fn state(&self) -> ProcessState {
        ProcessState::Delay {
            resources_received: self.resources_received,
            resources_released: self.resources_released,
        }
    }

    fn reset(&mut self) {
        self.resources_received = 0.0;
        self.resources_released = 0.0;
        self.buffered = 0.0;
        self.release_pending = false;
    }

    fn on_tick(&mut self, _ctx: &ProcessContext) -> Result<Vec<Event>> {
        // Message-driven; releases ride the scheduler.
        Ok(Vec::new())
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Result<Delivery> {
        match event.payload {
            Payload::Transfer { amount } => {
                self.resources_received += amount;
                match self.config.action {
                    // One scheduled release per inbound transfer.
                    Action::Delay => {
                        let emitted = match ctx.outbound.first() {
                            Some(view) => vec![Event::transfer(
                                &self.id,
                                &view.source_port,
                                &view.target_id,
                                &view.target_port,
                                ctx.time + view.flow_rate,
                                amount,
                            )],
                            // No outgoing connection: the amount stays
                            // in-flight until one appears.
                            None => Vec::new(),
                        };
                        Ok(Delivery {
                            accepted: amount,
                            emitted,
                        })
                    }
                    _ => {
                        self.buffered += amount;
                        let mut emitted = Vec::new();
                        if !self.release_pending {
                            if let Some(view) = ctx.outbound.first() {
                                emitted.push(self.release_marker(ctx.time + view.flow_rate));
                                self.release_pending = true;
                            }
                        }
                        Ok(Delivery {
                            accepted: amount,
                            emitted,
                        })
                    }
                }
            }
            Payload::Release if self.config.action == Action::Queue => {
                Ok(Delivery::emit(self.fire_release(ctx)))
            }
            _ => Ok(Delivery::ignore()),
        }
    }

    fn on_receipt(&mut self, event: &Event, _accepted: f64) {
        // Released counts the emitted amount; what downstream refused is
        // dropped, it does not return to the buffer.
        if matches!(event.payload, Payload::Transfer { .. }) {
            self.resources_released += event.amount();
        }
    }

    fn update_config(&mut self, config: ProcessConfig) -> Result<()> {
        match config {
            ProcessConfig::Delay(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(SimulationError::InvalidTransition(format!(
                "process {:?}: cannot reconfigure a Delay as {}",
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

    fn ctx_with_output(time: f64, flow_rate: f64) -> ProcessContext {
        ProcessContext {
            time,
            step: time as u64,
            inbound: Vec::new(),
            outbound: vec![ConnectionView {
                id: "c1".into(),
                source_id: "dl1".into(),
                source_port: "out".into(),
                target_id: "drain1".into(),
                target_port: "in".into(),
                flow_rate,
                peer_pullable: 0.0,
                peer_headroom: f64::INFINITY,
            }],
        }
    }

    fn transfer_at(time: f64, amount: f64) -> Event {
        Event::transfer("s1", "out", "dl1", "in", time, amount)
    }

    #[test]
    fn delay_mode_schedules_one_release_per_transfer() {
        let mut delay = Delay::new("dl1", DelayConfig::default());
        let ctx = ctx_with_output(1.0, 2.0);
        let delivery = delay.on_message(&transfer_at(1.0, 1.0), &ctx).unwrap();
        assert_eq!(delivery.accepted, 1.0);
        assert_eq!(delivery.emitted.len(), 1);
        assert_eq!(delivery.emitted[0].time, 3.0);
        assert_eq!(delivery.emitted[0].amount(), 1.0);
        assert_eq!(delivery.emitted[0].target_id, "drain1");
    }

    #[test]
    fn released_counts_emitted_amounts() {
        let mut delay = Delay::new("dl1", DelayConfig::default());
        let ctx = ctx_with_output(1.0, 2.0);
        let delivery = delay.on_message(&transfer_at(1.0, 1.0), &ctx).unwrap();
        delay.on_receipt(&delivery.emitted[0], 1.0);
        match delay.state() {
            ProcessState::Delay {
                resources_received,
                resources_released,
            } => {
                assert_eq!(resources_received, 1.0);
                assert_eq!(resources_released, 1.0);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn queue_mode_arms_a_single_release_marker() {
        let mut delay = Delay::new(
            "dl1",
            DelayConfig {
                action: Action::Queue,
                release_amount: 3.0,
                ..DelayConfig::default()
            },
        );
        let first = delay
            .on_message(&transfer_at(1.0, 1.0), &ctx_with_output(1.0, 2.0))
            .unwrap();
        assert_eq!(first.emitted.len(), 1);
        assert_eq!(first.emitted[0].payload, Payload::Release);
        assert_eq!(first.emitted[0].time, 3.0);

        // A second inbound while armed does not schedule another marker.
        let second = delay
            .on_message(&transfer_at(2.0, 1.0), &ctx_with_output(2.0, 2.0))
            .unwrap();
        assert!(second.emitted.is_empty());
    }

    #[test]
    fn queue_release_emits_exactly_release_amount_or_nothing() {
        let mut delay = Delay::new(
            "dl1",
            DelayConfig {
                action: Action::Queue,
                release_amount: 3.0,
                ..DelayConfig::default()
            },
        );
        let ctx = ctx_with_output(3.0, 2.0);
        delay
            .on_message(&transfer_at(1.0, 2.0), &ctx_with_output(1.0, 2.0))
            .unwrap();

        // Short buffer: the marker fires but nothing is emitted.
        let marker = delay.release_marker(3.0);
        let delivery = delay.on_message(&marker, &ctx).unwrap();
        assert!(delivery.emitted.is_empty());

        // Refill past the release amount, then fire again.
        delay
            .on_message(&transfer_at(3.0, 4.0), &ctx)
            .unwrap();
        let marker = delay.release_marker(5.0);
        let delivery = delay
            .on_message(&marker, &ctx_with_output(5.0, 2.0))
            .unwrap();
        assert_eq!(delivery.emitted.len(), 2);
        assert_eq!(delivery.emitted[0].amount(), 3.0);
        // Buffer still covers another release, so the marker is re-armed.
        assert_eq!(delivery.emitted[1].payload, Payload::Release);
        assert_eq!(delivery.emitted[1].time, 7.0);
    }
}
