//! The simulation kernel.
//!
//! Owns the process table, the connection table, the scheduler, and the
//! clock, and drives the per-step event loop:
//!
//! 1. Advance the clock by the Stepper's `dt` (1.0 without a Stepper)
//! 2. `on_tick` every process in registration order, buffering emissions
//! 3. Drain the scheduler of all events due at or before the current time,
//!    delivering each through `on_message` with acceptance feedback to the
//!    sender
//! 4. Leave future events queued; return the delivered events in order
//!
//! Steps are transactional: the kernel checkpoints processes, scheduler,
//! and clock at step entry and restores them if anything fails. Every
//! iteration anywhere in the simulation-facing path is over
//! insertion-ordered sequences, never over unordered maps.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::connection::{Connection, ConnectionRecord};
use crate::error::{Halted, Result, SimulationError};
use crate::event::Event;
use crate::model::Model;
use crate::process::{
    AsProcess, ConnectionView, Process, ProcessContext, ProcessKind, ProcessRecord,
};
use crate::scheduler::Scheduler;
use crate::state::SimulationState;

/// A resource-flow simulation. Single-threaded; callers that share one
/// across threads must serialize access themselves.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Registration order; every tick iterates this order.
    processes: Vec<Process>,
    process_index: HashMap<String, usize>,
    /// Insertion order; adjacency is resolved by scanning in this order.
    connections: Vec<Connection>,
    connection_index: HashMap<String, usize>,
    scheduler: Scheduler,
    time: f64,
    step: u64,
}

impl Default for Simulation {
    /// The empty simulation at time zero.
    fn default() -> Self {
        Self {
            processes: Vec::new(),
            process_index: HashMap::new(),
            connections: Vec::new(),
            connection_index: HashMap::new(),
            scheduler: Scheduler::new(),
            time: 0.0,
            step: 0,
        }
    }
}

impl Simulation {
    /// Validate and install the given records into a fresh simulation at
    /// time zero.
    pub fn new(processes: &[ProcessRecord], connections: &[ConnectionRecord]) -> Result<Self> {
        let mut sim = Self::default();
        for record in processes {
            sim.add_process(record)?;
        }
        for record in connections {
            sim.add_connection(record)?;
        }
        Ok(sim)
    }

    /// Build a simulation from a declarative model.
    pub fn from_model(model: &Model) -> Result<Self> {
        Self::new(&model.processes, &model.connections)
    }

    /// The installed structure as a declarative model.
    pub fn to_model(&self) -> Model {
        Model {
            name: None,
            description: None,
            processes: self.processes(),
            connections: self.connections(),
        }
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Register a process. Fails without mutating on duplicate ids, invalid
    /// configuration, or a second Stepper.
    pub fn add_process(&mut self, record: &ProcessRecord) -> Result<()> {
        if self.process_index.contains_key(&record.id) {
            return Err(SimulationError::DuplicateId(record.id.clone()));
        }
        if record.kind == ProcessKind::Stepper
            && self.processes.iter().any(|p| p.kind() == ProcessKind::Stepper)
        {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: a simulation holds at most one Stepper",
                record.id
            )));
        }
        let process = Process::from_record(record)?;
        debug!("registering {} {:?}", process.kind(), record.id);
        self.process_index
            .insert(record.id.clone(), self.processes.len());
        self.processes.push(process);
        Ok(())
    }

    /// Remove a process and every connection referencing it.
    pub fn remove_process(&mut self, id: &str) -> Result<()> {
        let idx = *self
            .process_index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        self.processes.remove(idx);
        self.connections
            .retain(|conn| conn.source_id != id && conn.target_id != id);
        self.rebuild_indices();
        debug!("removed process {id:?}");
        Ok(())
    }

    /// Replace a process's configuration. The record must carry the same id
    /// and kind; only configuration fields may change.
    pub fn update_process(&mut self, id: &str, record: &ProcessRecord) -> Result<()> {
        let idx = *self
            .process_index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        if record.id != id {
            return Err(SimulationError::InvalidTransition(format!(
                "process {id:?}: update must keep the id, got {:?}",
                record.id
            )));
        }
        if record.kind != self.processes[idx].kind() {
            return Err(SimulationError::InvalidTransition(format!(
                "process {id:?}: update must keep the kind {}, got {}",
                self.processes[idx].kind(),
                record.kind
            )));
        }
        // Resolve through the normal constructor so the record is validated
        // exactly as at registration.
        let config = Process::from_record(record)?.config();
        self.processes[idx].update_config(config)
    }

    /// Install a connection after validating both endpoints and ports.
    pub fn add_connection(&mut self, record: &ConnectionRecord) -> Result<()> {
        if self.connection_index.contains_key(&record.id) {
            return Err(SimulationError::DuplicateId(record.id.clone()));
        }
        let connection = Connection::from_record(record)?;
        self.validate_endpoints(&connection)?;
        debug!(
            "connecting {}.{} -> {}.{} at rate {}",
            connection.source_id,
            connection.source_port,
            connection.target_id,
            connection.target_port,
            connection.flow_rate
        );
        self.connection_index
            .insert(record.id.clone(), self.connections.len());
        self.connections.push(connection);
        Ok(())
    }

    /// Remove a connection.
    pub fn remove_connection(&mut self, id: &str) -> Result<()> {
        let idx = *self
            .connection_index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        self.connections.remove(idx);
        self.rebuild_indices();
        debug!("removed connection {id:?}");
        Ok(())
    }

    /// Replace a connection in place, revalidating endpoints and weight.
    pub fn update_connection(&mut self, id: &str, record: &ConnectionRecord) -> Result<()> {
        let idx = *self
            .connection_index
            .get(id)
            .ok_or_else(|| SimulationError::UnknownId(id.to_string()))?;
        if record.id != id {
            return Err(SimulationError::InvalidTransition(format!(
                "connection {id:?}: update must keep the id, got {:?}",
                record.id
            )));
        }
        let connection = Connection::from_record(record)?;
        self.validate_endpoints(&connection)?;
        self.connections[idx] = connection;
        Ok(())
    }

    fn validate_endpoints(&self, connection: &Connection) -> Result<()> {
        for endpoint in [&connection.source_id, &connection.target_id] {
            let Some(&idx) = self.process_index.get(endpoint) else {
                return Err(SimulationError::UnknownId(endpoint.clone()));
            };
            if self.processes[idx].kind() == ProcessKind::Stepper {
                return Err(SimulationError::InvalidConfig(format!(
                    "connection {:?}: a Stepper is never connected",
                    connection.id
                )));
            }
        }
        let source = &self.processes[self.process_index[&connection.source_id]];
        if !source.has_output_port(&connection.source_port) {
            return Err(SimulationError::PortUnknown {
                process: connection.source_id.clone(),
                port: connection.source_port.clone(),
            });
        }
        let target = &self.processes[self.process_index[&connection.target_id]];
        if !target.has_input_port(&connection.target_port) {
            return Err(SimulationError::PortUnknown {
                process: connection.target_id.clone(),
                port: connection.target_port.clone(),
            });
        }
        Ok(())
    }

    fn rebuild_indices(&mut self) {
        self.process_index = self
            .processes
            .iter()
            .enumerate()
            .map(|(idx, process)| (process.id().to_string(), idx))
            .collect();
        self.connection_index = self
            .connections
            .iter()
            .enumerate()
            .map(|(idx, connection)| (connection.id.clone(), idx))
            .collect();
    }

    /// Enqueue an externally produced event (the Interactive trigger path).
    pub fn inject(&mut self, event: Event) -> Result<()> {
        if !self.process_index.contains_key(&event.target_id) {
            return Err(SimulationError::UnknownId(event.target_id));
        }
        if !event.time.is_finite() || event.time < self.time {
            return Err(SimulationError::InvalidConfig(format!(
                "cannot inject an event at t={} before the current time {}",
                event.time, self.time
            )));
        }
        self.scheduler.enqueue(event);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Advance exactly one tick. On failure the step is rolled back and the
    /// simulation is left in its pre-step state.
    pub fn step(&mut self) -> Result<Vec<Event>> {
        let processes = self.processes.clone();
        let scheduler = self.scheduler.clone();
        let (time, step) = (self.time, self.step);
        match self.step_inner() {
            Ok(delivered) => Ok(delivered),
            Err(err) => {
                warn!("step {} failed, rolling back: {err}", step + 1);
                self.processes = processes;
                self.scheduler = scheduler;
                self.time = time;
                self.step = step;
                Err(err)
            }
        }
    }

    fn step_inner(&mut self) -> Result<Vec<Event>> {
        self.step += 1;
        self.time += self.dt();
        let budget = 10 * (self.processes.len() + self.connections.len()) + 64;

        // Tick phase, registration order. Emissions are buffered through the
        // scheduler so same-time events retain emission order.
        for idx in 0..self.processes.len() {
            let ctx = self.context_for(idx);
            for event in self.processes[idx].on_tick(&ctx)? {
                self.scheduler.enqueue(event);
            }
        }

        // Drain phase: everything due now, FIFO among equal times.
        let mut delivered = Vec::new();
        while self.scheduler.peek_earliest_time() <= self.time {
            if delivered.len() >= budget {
                return Err(SimulationError::CascadeOverflow {
                    step: self.step,
                    budget,
                });
            }
            let Some(event) = self.scheduler.pop_earliest() else {
                break;
            };
            let Some(&target_idx) = self.process_index.get(&event.target_id) else {
                // The target was removed after the event was scheduled.
                warn!("dropping event addressed to removed process {:?}", event.target_id);
                continue;
            };
            let ctx = self.context_for(target_idx);
            let delivery = self.processes[target_idx].on_message(&event, &ctx)?;
            for emitted in delivery.emitted {
                self.scheduler.enqueue(emitted);
            }
            if let Some(&source_idx) = self.process_index.get(&event.source_id) {
                self.processes[source_idx].on_receipt(&event, delivery.accepted);
            }
            delivered.push(event);
        }

        debug!(
            "step {}: t={}, {} events delivered, {} pending",
            self.step,
            self.time,
            delivered.len(),
            self.scheduler.len()
        );
        Ok(delivered)
    }

    /// Step until the clock reaches `target_time`. On failure, completed
    /// steps remain applied and the error reports how far the run got.
    pub fn step_until(&mut self, target_time: f64) -> std::result::Result<Vec<Event>, Halted> {
        let mut events = Vec::new();
        let mut completed = 0;
        while self.time < target_time {
            match self.step() {
                Ok(mut delivered) => {
                    events.append(&mut delivered);
                    completed += 1;
                }
                Err(error) => {
                    return Err(Halted {
                        completed,
                        events,
                        error,
                    });
                }
            }
        }
        Ok(events)
    }

    /// Step `n` times. On failure, completed steps remain applied and the
    /// error reports how far the run got.
    pub fn step_n(&mut self, n: u64) -> std::result::Result<Vec<Event>, Halted> {
        let mut events = Vec::new();
        for completed in 0..n {
            match self.step() {
                Ok(mut delivered) => events.append(&mut delivered),
                Err(error) => {
                    return Err(Halted {
                        completed,
                        events,
                        error,
                    });
                }
            }
        }
        Ok(events)
    }

    /// Clear the scheduler, zero the clock, and reset every process to its
    /// initial state. The structure (processes, connections) is kept.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.time = 0.0;
        self.step = 0;
        for process in &mut self.processes {
            process.reset();
        }
        debug!("simulation reset");
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Assemble an immutable snapshot of global time/step and every
    /// process's state.
    pub fn get_simulation_state(&self) -> SimulationState {
        let process_states: BTreeMap<String, _> = self
            .processes
            .iter()
            .map(|process| (process.id().to_string(), process.state()))
            .collect();
        SimulationState {
            time: self.time,
            step: self.step,
            process_states,
        }
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    /// Installed process records in registration order.
    pub fn processes(&self) -> Vec<ProcessRecord> {
        self.processes.iter().map(Process::to_record).collect()
    }

    /// Installed connection records in insertion order.
    pub fn connections(&self) -> Vec<ConnectionRecord> {
        self.connections.iter().map(Connection::to_record).collect()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Time advanced per step: the Stepper's `dt`, or 1.0 without one.
    fn dt(&self) -> f64 {
        self.processes
            .iter()
            .find_map(|process| match process {
                Process::Stepper(stepper) => Some(stepper.dt()),
                _ => None,
            })
            .unwrap_or(1.0)
    }

    /// Capture the clock and this process's adjacent connections, including
    /// what each peer could currently supply or absorb. Owned data, so the
    /// borrow ends before the process runs.
    fn context_for(&self, idx: usize) -> ProcessContext {
        let pid = self.processes[idx].id();
        let mut inbound = Vec::new();
        let mut outbound = Vec::new();
        for connection in &self.connections {
            if connection.target_id == pid {
                let peer_pullable = self
                    .process_index
                    .get(&connection.source_id)
                    .map_or(0.0, |&i| self.processes[i].pullable(&connection.source_port));
                inbound.push(Self::view(connection, peer_pullable, f64::INFINITY));
            }
            if connection.source_id == pid {
                let peer_headroom = self
                    .process_index
                    .get(&connection.target_id)
                    .map_or(0.0, |&i| self.processes[i].headroom());
                outbound.push(Self::view(connection, 0.0, peer_headroom));
            }
        }
        ProcessContext {
            time: self.time,
            step: self.step,
            inbound,
            outbound,
        }
    }

    fn view(connection: &Connection, peer_pullable: f64, peer_headroom: f64) -> ConnectionView {
        ConnectionView {
            id: connection.id.clone(),
            source_id: connection.source_id.clone(),
            source_port: connection.source_port.clone(),
            target_id: connection.target_id.clone(),
            target_port: connection.target_port.clone(),
            flow_rate: connection.flow_rate,
            peer_pullable,
            peer_headroom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_pool_model() -> Simulation {
        Simulation::new(
            &[
                ProcessRecord::new("source1", ProcessKind::Source),
                ProcessRecord::new("pool1", ProcessKind::Pool),
                ProcessRecord::new("stepper", ProcessKind::Stepper),
            ],
            &[ConnectionRecord::new("c1", "source1", "pool1")],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_process_id_is_rejected() {
        let mut sim = source_pool_model();
        let err = sim
            .add_process(&ProcessRecord::new("pool1", ProcessKind::Pool))
            .unwrap_err();
        assert_eq!(err.kind(), "DuplicateId");
        assert_eq!(sim.process_count(), 3);
    }

    #[test]
    fn second_stepper_is_rejected() {
        let mut sim = source_pool_model();
        let err = sim
            .add_process(&ProcessRecord::new("stepper2", ProcessKind::Stepper))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn connection_endpoints_must_exist() {
        let mut sim = source_pool_model();
        let err = sim
            .add_connection(&ConnectionRecord::new("c2", "source1", "ghost"))
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownId");
        assert_eq!(sim.connection_count(), 1);
    }

    #[test]
    fn connection_ports_must_be_declared() {
        let mut sim = source_pool_model();
        let mut record = ConnectionRecord::new("c2", "source1", "pool1");
        record.target_port = Some("side".into());
        let err = sim.add_connection(&record).unwrap_err();
        assert_eq!(err.kind(), "PortUnknown");
    }

    #[test]
    fn stepper_cannot_be_connected() {
        let mut sim = source_pool_model();
        let err = sim
            .add_connection(&ConnectionRecord::new("c2", "source1", "stepper"))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn removing_a_process_cascades_to_its_connections() {
        let mut sim = source_pool_model();
        sim.remove_process("pool1").unwrap();
        assert_eq!(sim.connection_count(), 0);
        assert_eq!(sim.process_count(), 2);
        // The remaining structure still steps.
        assert!(sim.step().is_ok());
    }

    #[test]
    fn update_keeps_id_and_kind() {
        let mut sim = source_pool_model();
        let err = sim
            .update_process("pool1", &ProcessRecord::new("pool1", ProcessKind::Drain))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidTransition");

        let err = sim
            .update_process("pool1", &ProcessRecord::new("pool2", ProcessKind::Pool))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidTransition");

        sim.update_process(
            "pool1",
            &ProcessRecord::new("pool1", ProcessKind::Pool).with_capacity(10.0),
        )
        .unwrap();
    }

    #[test]
    fn dt_comes_from_the_stepper() {
        let mut sim = Simulation::new(
            &[ProcessRecord::new("clock", ProcessKind::Stepper).with_dt(0.5)],
            &[],
        )
        .unwrap();
        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.current_time(), 1.0);
        assert_eq!(sim.current_step(), 2);
    }

    #[test]
    fn stepless_simulation_advances_by_one() {
        let mut sim = Simulation::new(&[ProcessRecord::new("p", ProcessKind::Pool)], &[]).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.current_time(), 1.0);
    }

    #[test]
    fn inject_validates_target_and_time() {
        let mut sim = source_pool_model();
        sim.step_n(3).unwrap();

        let mut event = Event::transfer("external", "out", "ghost", "in", 5.0, 1.0);
        assert!(sim.inject(event.clone()).is_err());

        event.target_id = "pool1".into();
        event.time = 1.0; // in the past
        assert!(sim.inject(event.clone()).is_err());

        event.time = 5.0;
        sim.inject(event).unwrap();
    }

    #[test]
    fn injected_transfer_is_delivered_at_its_time() {
        let mut sim = source_pool_model();
        sim.inject(Event::transfer("external", "out", "pool1", "in", 2.0, 10.0))
            .unwrap();
        sim.step().unwrap();
        // t=1: only the source's own transfer has arrived.
        assert_eq!(sim.get_simulation_state().pool_resources("pool1"), Some(1.0));
        sim.step().unwrap();
        // t=2: source transfer + injected 10.
        assert_eq!(sim.get_simulation_state().pool_resources("pool1"), Some(12.0));
    }
}
