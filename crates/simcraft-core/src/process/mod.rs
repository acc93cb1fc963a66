//! Process variants and the capability set they share.
//!
//! Processes are a tagged sum: five concrete variant structs behind the
//! [`Process`] enum, dispatched by tag. Each variant implements
//! [`AsProcess`]; the enum delegates. Cross-process effects never happen
//! here — variants mutate only their own state and describe everything else
//! as emitted [`Event`]s for the kernel to deliver.

pub mod delay;
pub mod drain;
pub mod pool;
pub mod source;
pub mod stepper;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::event::Event;
use crate::state::ProcessState;

pub use delay::{Delay, DelayConfig};
pub use drain::{Drain, DrainConfig};
pub use pool::{Pool, PoolConfig};
pub use source::{Source, SourceConfig};
pub use stepper::{Stepper, StepperConfig};

// ---------------------------------------------------------------------------
// Tags and modes
// ---------------------------------------------------------------------------

/// Kind tag of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessKind {
    Source,
    Pool,
    Drain,
    Delay,
    Stepper,
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "Source"),
            Self::Pool => write!(f, "Pool"),
            Self::Drain => write!(f, "Drain"),
            Self::Delay => write!(f, "Delay"),
            Self::Stepper => write!(f, "Stepper"),
        }
    }
}

/// When a process fires its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Fires every tick.
    #[default]
    Automatic,
    /// Fires only when pulled by a downstream process.
    Passive,
    /// Fires only in response to an externally injected trigger event.
    Interactive,
    /// Reserved; behaves as Passive.
    Enabling,
}

/// What a process does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    PushAny,
    PushAll,
    PullAny,
    PullAll,
    /// Delay variant: per-unit independent delay.
    Delay,
    /// Delay variant: batched queue release.
    Queue,
}

impl Action {
    /// Whether this is a sender-initiated push.
    pub fn is_push(self) -> bool {
        matches!(self, Self::PushAny | Self::PushAll)
    }

    /// Whether this is a receiver-initiated pull.
    pub fn is_pull(self) -> bool {
        matches!(self, Self::PullAny | Self::PullAll)
    }
}

/// Policy for a Pool receiving more than it can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Overflow {
    /// Refuse the remainder; the sender keeps it.
    #[default]
    Block,
    /// Accept and silently discard the remainder.
    Drain,
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// Process wire form. Fields not applicable to the declared kind are
/// rejected at resolution time; unknown fields are rejected by serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProcessKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_mode: Option<TriggerMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<Overflow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_resources: Option<f64>,
}

impl ProcessRecord {
    /// A record of the given kind with every optional field unset.
    pub fn new(id: impl Into<String>, kind: ProcessKind) -> Self {
        Self {
            id: id.into(),
            kind,
            trigger_mode: None,
            action: None,
            capacity: None,
            overflow: None,
            release_amount: None,
            dt: None,
            initial_resources: None,
        }
    }

    pub fn with_trigger_mode(mut self, trigger_mode: TriggerMode) -> Self {
        self.trigger_mode = Some(trigger_mode);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = Some(overflow);
        self
    }

    pub fn with_release_amount(mut self, release_amount: f64) -> Self {
        self.release_amount = Some(release_amount);
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn with_initial_resources(mut self, initial_resources: f64) -> Self {
        self.initial_resources = Some(initial_resources);
        self
    }

    /// Reject any optional field outside the allowed set for the kind.
    fn reject_foreign_fields(&self, allowed: &[&str]) -> Result<()> {
        let present: [(&str, bool); 7] = [
            ("trigger_mode", self.trigger_mode.is_some()),
            ("action", self.action.is_some()),
            ("capacity", self.capacity.is_some()),
            ("overflow", self.overflow.is_some()),
            ("release_amount", self.release_amount.is_some()),
            ("dt", self.dt.is_some()),
            ("initial_resources", self.initial_resources.is_some()),
        ];
        for (name, is_set) in present {
            if is_set && !allowed.contains(&name) {
                return Err(SimulationError::InvalidConfig(format!(
                    "process {:?}: field {name:?} is not valid for kind {}",
                    self.id, self.kind
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Cloneable per-kind configuration, the discriminated union behind
/// `update_process`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessConfig {
    Source(SourceConfig),
    Pool(PoolConfig),
    Drain(DrainConfig),
    Delay(DelayConfig),
    Stepper(StepperConfig),
}

impl ProcessConfig {
    pub fn kind(&self) -> ProcessKind {
        match self {
            Self::Source(_) => ProcessKind::Source,
            Self::Pool(_) => ProcessKind::Pool,
            Self::Drain(_) => ProcessKind::Drain,
            Self::Delay(_) => ProcessKind::Delay,
            Self::Stepper(_) => ProcessKind::Stepper,
        }
    }
}

// ---------------------------------------------------------------------------
// Kernel-assembled context
// ---------------------------------------------------------------------------

/// View of one adjacent connection, captured by the kernel immediately
/// before a tick or a delivery runs.
#[derive(Debug, Clone)]
pub struct ConnectionView {
    pub id: String,
    pub source_id: String,
    pub source_port: String,
    pub target_id: String,
    pub target_port: String,
    pub flow_rate: f64,
    /// How much the peer at the other end could supply to a pull right now.
    /// Meaningful on inbound views.
    pub peer_pullable: f64,
    /// Capacity headroom at the peer. Meaningful on outbound views.
    pub peer_headroom: f64,
}

/// Context handed to `on_tick` and `on_message`: the clock plus this
/// process's adjacent connections in insertion order.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub time: f64,
    pub step: u64,
    /// Connections targeting this process.
    pub inbound: Vec<ConnectionView>,
    /// Connections sourced at this process.
    pub outbound: Vec<ConnectionView>,
}

/// Outcome of delivering one inbound event.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Amount of the inbound transfer credited to the receiver. In-band
    /// capacity result: a Block-policy Pool reports less than the transfer
    /// amount and the kernel feeds the difference back to the sender.
    pub accepted: f64,
    /// Events emitted in response; may be same-time, forming a cascade.
    pub emitted: Vec<Event>,
}

impl Delivery {
    /// Accept `accepted` units, emitting nothing.
    pub fn accept(accepted: f64) -> Self {
        Self {
            accepted,
            emitted: Vec::new(),
        }
    }

    /// Accept nothing and emit nothing.
    pub fn ignore() -> Self {
        Self::accept(0.0)
    }

    /// Accept nothing, emit the given events.
    pub fn emit(emitted: Vec<Event>) -> Self {
        Self {
            accepted: 0.0,
            emitted,
        }
    }
}

// ---------------------------------------------------------------------------
// Capability set
// ---------------------------------------------------------------------------

/// The capability set every process variant implements.
pub trait AsProcess {
    fn id(&self) -> &str;
    fn kind(&self) -> ProcessKind;
    /// Declared input ports.
    fn input_ports(&self) -> &'static [&'static str];
    /// Declared output ports.
    fn output_ports(&self) -> &'static [&'static str];
    fn config(&self) -> ProcessConfig;
    /// Variant-tagged state record.
    fn state(&self) -> ProcessState;
    /// Restore internal state to its initial value. The kernel clears the
    /// scheduler and the clock around this call.
    fn reset(&mut self);
    /// Invoked once per Stepper tick; emits outgoing events.
    fn on_tick(&mut self, ctx: &ProcessContext) -> Result<Vec<Event>>;
    /// Invoked when an inbound event is delivered to this process.
    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Result<Delivery>;
    /// Acceptance feedback: invoked on the *sender* after one of its events
    /// was delivered, with the amount the receiver credited.
    fn on_receipt(&mut self, _event: &Event, _accepted: f64) {}
    /// How much this process could supply to a pull request on `port` right
    /// now. Zero for processes that push the same edge automatically.
    fn pullable(&self, _port: &str) -> f64 {
        0.0
    }
    /// Remaining capacity headroom for inbound transfers.
    fn headroom(&self) -> f64 {
        f64::INFINITY
    }
    /// Apply a configuration change, or refuse it.
    fn update_config(&mut self, config: ProcessConfig) -> Result<()>;
}

// ---------------------------------------------------------------------------
// The tagged sum
// ---------------------------------------------------------------------------

/// A process: one of the five built-in variants, dispatched by tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Process {
    Source(Source),
    Pool(Pool),
    Drain(Drain),
    Delay(Delay),
    Stepper(Stepper),
}

impl Process {
    /// Resolve and validate a wire record into a process at its initial
    /// state.
    pub fn from_record(record: &ProcessRecord) -> Result<Self> {
        if record.id.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "process id must not be empty".into(),
            ));
        }
        match record.kind {
            ProcessKind::Source => Ok(Self::Source(Source::from_record(record)?)),
            ProcessKind::Pool => Ok(Self::Pool(Pool::from_record(record)?)),
            ProcessKind::Drain => Ok(Self::Drain(Drain::from_record(record)?)),
            ProcessKind::Delay => Ok(Self::Delay(Delay::from_record(record)?)),
            ProcessKind::Stepper => Ok(Self::Stepper(Stepper::from_record(record)?)),
        }
    }

    /// Wire form of this process's configuration. Fields equal to their
    /// defaults are omitted, so records round-trip to equivalent inputs.
    pub fn to_record(&self) -> ProcessRecord {
        match self {
            Self::Source(p) => p.to_record(),
            Self::Pool(p) => p.to_record(),
            Self::Drain(p) => p.to_record(),
            Self::Delay(p) => p.to_record(),
            Self::Stepper(p) => p.to_record(),
        }
    }

    /// Whether `port` is a declared input port.
    pub fn has_input_port(&self, port: &str) -> bool {
        self.input_ports().contains(&port)
    }

    /// Whether `port` is a declared output port.
    pub fn has_output_port(&self, port: &str) -> bool {
        self.output_ports().contains(&port)
    }
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            Process::Source($p) => $body,
            Process::Pool($p) => $body,
            Process::Drain($p) => $body,
            Process::Delay($p) => $body,
            Process::Stepper($p) => $body,
        }
    };
}

impl AsProcess for Process {
    fn id(&self) -> &str {
        dispatch!(self, p => p.id())
    }

    fn kind(&self) -> ProcessKind {
        dispatch!(self, p => p.kind())
    }

    fn input_ports(&self) -> &'static [&'static str] {
        dispatch!(self, p => p.input_ports())
    }

    fn output_ports(&self) -> &'static [&'static str] {
        dispatch!(self, p => p.output_ports())
    }

    fn config(&self) -> ProcessConfig {
        dispatch!(self, p => p.config())
    }

    fn state(&self) -> ProcessState {
        dispatch!(self, p => p.state())
    }

    fn reset(&mut self) {
        dispatch!(self, p => p.reset())
    }

    fn on_tick(&mut self, ctx: &ProcessContext) -> Result<Vec<Event>> {
        dispatch!(self, p => p.on_tick(ctx))
    }

    fn on_message(&mut self, event: &Event, ctx: &ProcessContext) -> Result<Delivery> {
        dispatch!(self, p => p.on_message(event, ctx))
    }

    fn on_receipt(&mut self, event: &Event, accepted: f64) {
        dispatch!(self, p => p.on_receipt(event, accepted))
    }

    fn pullable(&self, port: &str) -> f64 {
        dispatch!(self, p => p.pullable(port))
    }

    fn headroom(&self) -> f64 {
        dispatch!(self, p => p.headroom())
    }

    fn update_config(&mut self, config: ProcessConfig) -> Result<()> {
        dispatch!(self, p => p.update_config(config))
    }
}
