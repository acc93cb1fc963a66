//! Pool: accumulates resources, bounded by an optional capacity.

use serde::{Deserialize, Serialize};

use crate::connection::DEFAULT_OUTPUT_PORT;
use crate::error::{Result, SimulationError};
use crate::event::{Event, Payload};
use crate::state::ProcessState;

use super::{
    Action, AsProcess, Delivery, Overflow, ProcessConfig, ProcessContext, ProcessKind,
    ProcessRecord, TriggerMode,
};

/// Pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub trigger_mode: TriggerMode,
    /// One of PullAny, PullAll, PushAny, PushAll.
    pub action: Action,
    pub overflow: Overflow,
    /// Upper bound on `resources`; `None` is unbounded.
    pub capacity: Option<f64>,
    /// Level at creation and after every reset.
    pub initial_resources: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            trigger_mode: TriggerMode::default(),
            action: Action::PullAny,
            overflow: Overflow::default(),
            capacity: None,
            initial_resources: 0.0,
        }
    }
}

/// Holds a real-valued resource level within `[0, capacity]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    id: String,
    config: PoolConfig,
    resources: f64,
}

impl Pool {
    pub fn new(id: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            id: id.into(),
            resources: config.initial_resources,
            config,
        }
    }

    pub(crate) fn from_record(record: &ProcessRecord) -> Result<Self> {
        record.reject_foreign_fields(&[
            "trigger_mode",
            "action",
            "capacity",
            "overflow",
            "initial_resources",
        ])?;
        let action = record.action.unwrap_or(Action::PullAny);
        if !action.is_pull() && !action.is_push() {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: action {action:?} is not valid for a Pool",
                record.id
            )));
        }
        let capacity = record.capacity;
        if let Some(capacity) = capacity {
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(SimulationError::InvalidConfig(format!(
                    "process {:?}: capacity must be a positive real, got {capacity}",
                    record.id
                )));
            }
        }
        let initial_resources = record.initial_resources.unwrap_or(0.0);
        if !initial_resources.is_finite() || initial_resources < 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: initial_resources must be non-negative, got {initial_resources}",
                record.id
            )));
        }
        if let Some(capacity) = capacity {
            if initial_resources > capacity {
                return Err(SimulationError::InvalidConfig(format!(
                    "process {:?}: initial_resources {initial_resources} exceeds capacity {capacity}",
                    record.id
                )));
            }
        }
        Ok(Self::new(
            &record.id,
            PoolConfig {
                trigger_mode: record.trigger_mode.unwrap_or_default(),
                action,
                overflow: record.overflow.unwrap_or_default(),
                capacity,
                initial_resources,
            },
        ))
    }

    pub(crate) fn to_record(&self) -> ProcessRecord {
        let mut record = ProcessRecord::new(&self.id, ProcessKind::Pool);
        if self.config.trigger_mode != TriggerMode::Automatic {
            record.trigger_mode = Some(self.config.trigger_mode);
        }
        if self.config.action != Action::PullAny {
            record.action = Some(self.config.action);
        }
        if self.config.overflow != Overflow::default() {
            record.overflow = Some(self.config.overflow);
        }
        record.capacity = self.config.capacity;
        if self.config.initial_resources != 0.0 {
            record.initial_resources = Some(self.config.initial_resources);
        }
        record
    }

    /// Current level.
    pub fn resources(&self) -> f64 {
        self.resources
    }

    /// Whether pull requests on the output edge are answered. A pool that
    /// pushes its outputs automatically already fires those edges itself;
    /// answering a pull too would transfer twice per tick.
    fn answers_pulls(&self) -> bool {
        !(self.config.trigger_mode == TriggerMode::Automatic && self.config.action.is_push())
    }

    /// Fire the configured action once.
    fn fire(&mut self, ctx: &ProcessContext) -> Vec<Event> {
        match self.config.action {
            Action::PullAny => {
                // Take whatever partial amounts upstreams can supply, up to
                // the remaining headroom.
                let mut headroom = self.headroom();
                let mut events = Vec::new();
                for view in &ctx.inbound {
                    let amount = view.flow_rate.min(view.peer_pullable).min(headroom);
                    if amount > 0.0 {
                        headroom -= amount;
                        events.push(Event::pull_request(
                            &self.id,
                            &view.target_port,
                            &view.source_id,
                            &view.source_port,
                            ctx.time,
                            amount,
                        ));
                    }
                }
                events
            }
            Action::PullAll => {
                // All-or-nothing against the tick-start view of upstreams.
                if ctx.inbound.is_empty() {
                    return Vec::new();
                }
                let total: f64 = ctx.inbound.iter().map(|view| view.flow_rate).sum();
                let all_supplied = ctx
                    .inbound
                    .iter()
                    .all(|view| view.peer_pullable >= view.flow_rate);
                if !all_supplied || total > self.headroom() {
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
            Action::PushAny => {
                // Per-edge independent; the level is debited at emission and
                // refused remainders come back via on_receipt.
                let mut events = Vec::new();
                for view in &ctx.outbound {
                    let amount = view.flow_rate.min(self.resources);
                    if amount > 0.0 {
                        self.resources -= amount;
                        events.push(Event::transfer(
                            &self.id,
                            &view.source_port,
                            &view.target_id,
                            &view.target_port,
                            ctx.time,
                            amount,
                        ));
                    }
                }
                events
            }
            Action::PushAll => {
                // Withhold everything unless the level covers every edge and
                // no downstream would refuse, per the tick-start view.
                if ctx.outbound.is_empty() {
                    return Vec::new();
                }
                let total: f64 = ctx.outbound.iter().map(|view| view.flow_rate).sum();
                let any_refuses = ctx
                    .outbound
                    .iter()
                    .any(|view| view.peer_headroom < view.flow_rate);
                if self.resources < total || any_refuses {
                    return Vec::new();
                }
                self.resources -= total;
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
            // Delay/Queue are rejected at configuration time.
            _ => Vec::new(),
        }
    }
}

impl AsProcess for Pool {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Pool
    }

    fn input_ports(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn output_ports(&self) -> &'static [&'static str] {
        &["out"]
    }

    fn config(&self) -> ProcessConfig {
        ProcessConfig::Pool(self.config)
    }

    fn state(&self) -> ProcessState {
        ProcessState::Pool {
            resources: self.resources,
        }
    }

    fn reset(&mut self) {
        self.resources = self.config.initial_resources;
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
                let take = amount.min(self.headroom());
                self.resources += take;
                let accepted = match self.config.overflow {
                    // Refused remainder goes back to the sender in-band.
                    Overflow::Block => take,
                    // Remainder is credited to the sender, then discarded.
                    Overflow::Drain => amount,
                };
                Ok(Delivery::accept(accepted))
            }
            Payload::PullRequest { amount } if self.answers_pulls() => {
                let grant = amount.min(self.resources);
                if grant <= 0.0 {
                    return Ok(Delivery::ignore());
                }
                self.resources -= grant;
                let source_port = event
                    .target_port
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OUTPUT_PORT.to_string());
                Ok(Delivery::emit(vec![Event::transfer(
                    &self.id,
                    source_port,
                    &event.source_id,
                    event.source_port.clone().unwrap_or_default(),
                    ctx.time,
                    grant,
                )]))
            }
            Payload::Trigger if self.config.trigger_mode == TriggerMode::Interactive => {
                Ok(Delivery::emit(self.fire(ctx)))
            }
            _ => Ok(Delivery::ignore()),
        }
    }

    fn on_receipt(&mut self, event: &Event, accepted: f64) {
        // Reclaim what the receiver refused; the level was debited at
        // emission time. Clipped at capacity for the corner where inbound
        // transfers refilled the pool in between.
        if matches!(event.payload, Payload::Transfer { .. }) {
            let returned = event.amount() - accepted;
            if returned > 0.0 {
                self.resources = match self.config.capacity {
                    Some(capacity) => (self.resources + returned).min(capacity),
                    None => self.resources + returned,
                };
            }
        }
    }

    fn pullable(&self, _port: &str) -> f64 {
        if self.answers_pulls() {
            self.resources
        } else {
            0.0
        }
    }

    fn headroom(&self) -> f64 {
        self.config
            .capacity
            .map_or(f64::INFINITY, |capacity| {
                (capacity - self.resources).max(0.0)
            })
    }

    fn update_config(&mut self, config: ProcessConfig) -> Result<()> {
        match config {
            ProcessConfig::Pool(config) => {
                if let Some(capacity) = config.capacity {
                    if capacity < self.resources {
                        return Err(SimulationError::InvalidTransition(format!(
                            "process {:?}: capacity {capacity} is below the current level {}",
                            self.id, self.resources
                        )));
                    }
                }
                self.config = config;
                Ok(())
            }
            other => Err(SimulationError::InvalidTransition(format!(
                "process {:?}: cannot reconfigure a Pool as {}",
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

    fn pool_with(capacity: Option<f64>, overflow: Overflow) -> Pool {
        Pool::new(
            "p1",
            PoolConfig {
                capacity,
                overflow,
                ..PoolConfig::default()
            },
        )
    }

    fn transfer(amount: f64) -> Event {
        Event::transfer("s1", "out", "p1", "in", 1.0, amount)
    }

    fn empty_ctx() -> ProcessContext {
        ProcessContext {
            time: 1.0,
            step: 1,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    fn view(source_id: &str, flow_rate: f64, peer_pullable: f64) -> ConnectionView {
        ConnectionView {
            id: format!("c-{source_id}"),
            source_id: source_id.into(),
            source_port: "out".into(),
            target_id: "p1".into(),
            target_port: "in".into(),
            flow_rate,
            peer_pullable,
            peer_headroom: f64::INFINITY,
        }
    }

    #[test]
    fn unbounded_pool_accepts_everything() {
        let mut pool = pool_with(None, Overflow::Block);
        let delivery = pool.on_message(&transfer(7.5), &empty_ctx()).unwrap();
        assert_eq!(delivery.accepted, 7.5);
        assert_eq!(pool.resources(), 7.5);
    }

    #[test]
    fn block_policy_returns_the_remainder() {
        let mut pool = pool_with(Some(3.0), Overflow::Block);
        pool.on_message(&transfer(2.0), &empty_ctx()).unwrap();
        let delivery = pool.on_message(&transfer(2.0), &empty_ctx()).unwrap();
        assert_eq!(delivery.accepted, 1.0);
        assert_eq!(pool.resources(), 3.0);
    }

    #[test]
    fn drain_policy_discards_the_remainder() {
        let mut pool = pool_with(Some(3.0), Overflow::Drain);
        pool.on_message(&transfer(5.0), &empty_ctx()).unwrap();
        let delivery = pool.on_message(&transfer(5.0), &empty_ctx()).unwrap();
        // The full amount is credited to the sender even though it is gone.
        assert_eq!(delivery.accepted, 5.0);
        assert_eq!(pool.resources(), 3.0);
    }

    #[test]
    fn pull_any_takes_partial_amounts() {
        let mut pool = pool_with(None, Overflow::Block);
        let mut ctx = empty_ctx();
        ctx.inbound = vec![view("a", 2.0, 0.5), view("b", 2.0, f64::INFINITY)];
        let events = pool.on_tick(&ctx).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].payload,
            Payload::PullRequest { amount: 0.5 }
        );
        assert_eq!(
            events[1].payload,
            Payload::PullRequest { amount: 2.0 }
        );
    }

    #[test]
    fn pull_all_is_all_or_nothing() {
        let mut pool = Pool::new(
            "p1",
            PoolConfig {
                action: Action::PullAll,
                ..PoolConfig::default()
            },
        );
        let mut ctx = empty_ctx();
        ctx.inbound = vec![view("a", 2.0, 1.0), view("b", 2.0, f64::INFINITY)];
        assert!(pool.on_tick(&ctx).unwrap().is_empty());

        ctx.inbound = vec![view("a", 2.0, 2.0), view("b", 2.0, f64::INFINITY)];
        assert_eq!(pool.on_tick(&ctx).unwrap().len(), 2);
    }

    #[test]
    fn push_any_debits_at_emission_and_reclaims_refusals() {
        let mut pool = Pool::new(
            "p1",
            PoolConfig {
                action: Action::PushAny,
                initial_resources: 5.0,
                ..PoolConfig::default()
            },
        );
        let mut ctx = empty_ctx();
        ctx.outbound = vec![ConnectionView {
            id: "c1".into(),
            source_id: "p1".into(),
            source_port: "out".into(),
            target_id: "q".into(),
            target_port: "in".into(),
            flow_rate: 2.0,
            peer_pullable: 0.0,
            peer_headroom: f64::INFINITY,
        }];
        let events = pool.on_tick(&ctx).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(pool.resources(), 3.0);

        // Downstream refused half of it.
        pool.on_receipt(&events[0], 1.0);
        assert_eq!(pool.resources(), 4.0);
    }

    #[test]
    fn push_all_withholds_when_any_downstream_refuses() {
        let mut pool = Pool::new(
            "p1",
            PoolConfig {
                action: Action::PushAll,
                initial_resources: 10.0,
                ..PoolConfig::default()
            },
        );
        let mut ctx = empty_ctx();
        let outbound = |headroom: f64| ConnectionView {
            id: "c1".into(),
            source_id: "p1".into(),
            source_port: "out".into(),
            target_id: "q".into(),
            target_port: "in".into(),
            flow_rate: 2.0,
            peer_pullable: 0.0,
            peer_headroom: headroom,
        };
        ctx.outbound = vec![outbound(1.0)];
        assert!(pool.on_tick(&ctx).unwrap().is_empty());
        assert_eq!(pool.resources(), 10.0);

        ctx.outbound = vec![outbound(2.0)];
        assert_eq!(pool.on_tick(&ctx).unwrap().len(), 1);
        assert_eq!(pool.resources(), 8.0);
    }

    #[test]
    fn capacity_shrink_below_level_is_rejected() {
        let mut pool = pool_with(Some(10.0), Overflow::Block);
        pool.on_message(&transfer(6.0), &empty_ctx()).unwrap();
        let err = pool
            .update_config(ProcessConfig::Pool(PoolConfig {
                capacity: Some(5.0),
                ..PoolConfig::default()
            }))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidTransition");
        // The original configuration is untouched.
        assert_eq!(pool.headroom(), 4.0);
    }

    #[test]
    fn reset_restores_initial_resources() {
        let mut pool = Pool::new(
            "p1",
            PoolConfig {
                initial_resources: 2.0,
                ..PoolConfig::default()
            },
        );
        pool.on_message(&transfer(3.0), &empty_ctx()).unwrap();
        assert_eq!(pool.resources(), 5.0);
        pool.reset();
        assert_eq!(pool.resources(), 2.0);
    }
}
