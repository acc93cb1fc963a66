//! Stepper: the singleton clock process.
//!
//! Never connected to other processes; the kernel delivers its tick
//! directly and reads `dt` from its configuration when advancing the clock.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::event::Event;
use crate::state::ProcessState;

use super::{
    AsProcess, Delivery, ProcessConfig, ProcessContext, ProcessKind, ProcessRecord, TriggerMode,
};

/// Stepper configuration. The trigger mode is fixed to Automatic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    /// Simulated time advanced per tick.
    pub dt: f64,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self { dt: 1.0 }
    }
}

/// Mirrors the kernel step counter.
#[derive(Debug, Clone, PartialEq)]
pub struct Stepper {
    id: String,
    config: StepperConfig,
    current_step: u64,
}

impl Stepper {
    pub fn new(id: impl Into<String>, config: StepperConfig) -> Self {
        Self {
            id: id.into(),
            config,
            current_step: 0,
        }
    }

    pub(crate) fn from_record(record: &ProcessRecord) -> Result<Self> {
        record.reject_foreign_fields(&["trigger_mode", "dt"])?;
        if let Some(trigger_mode) = record.trigger_mode {
            if trigger_mode != TriggerMode::Automatic {
                return Err(SimulationError::InvalidConfig(format!(
                    "process {:?}: a Stepper's trigger_mode is fixed to Automatic",
                    record.id
                )));
            }
        }
        let dt = record.dt.unwrap_or(1.0);
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "process {:?}: dt must be a positive real, got {dt}",
                record.id
            )));
        }
        Ok(Self::new(&record.id, StepperConfig { dt }))
    }

    pub(crate) fn to_record(&self) -> ProcessRecord {
        let mut record = ProcessRecord::new(&self.id, ProcessKind::Stepper);
        if self.config.dt != 1.0 {
            record.dt = Some(self.config.dt);
        }
        record
    }

    /// Simulated time advanced per tick.
    pub fn dt(&self) -> f64 {
        self.config.dt
    }
}

impl AsProcess for Stepper {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Stepper
    }

    fn input_ports(&self) -> &'static [&'static str] {
        &[]
    }

    fn output_ports(&self) -> &'static [&'static str] {
        &[]
    }

    fn config(&self) -> ProcessConfig {
        ProcessConfig::Stepper(self.config)
    }

    fn state(&self) -> ProcessState {
        ProcessState::Stepper {
            current_step: self.current_step,
        }
    }

    fn reset(&mut self) {
        self.current_step = 0;
    }

    fn on_tick(&mut self, _ctx: &ProcessContext) -> Result<Vec<Event>> {
        self.current_step += 1;
        Ok(Vec::new())
    }

    fn on_message(&mut self, _event: &Event, _ctx: &ProcessContext) -> Result<Delivery> {
        Ok(Delivery::ignore())
    }

    fn update_config(&mut self, config: ProcessConfig) -> Result<()> {
        match config {
            ProcessConfig::Stepper(config) => {
                self.config = config;
                Ok(())
            }
            other => Err(SimulationError::InvalidTransition(format!(
                "process {:?}: cannot reconfigure a Stepper as {}",
                self.id,
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ctx() -> ProcessContext {
        ProcessContext {
            time: 1.0,
            step: 1,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    #[test]
    fn tick_increments_and_reset_zeroes() {
        let mut stepper = Stepper::new("clock", StepperConfig::default());
        stepper.on_tick(&empty_ctx()).unwrap();
        stepper.on_tick(&empty_ctx()).unwrap();
        assert_eq!(stepper.state(), ProcessState::Stepper { current_step: 2 });
        stepper.reset();
        assert_eq!(stepper.state(), ProcessState::Stepper { current_step: 0 });
    }

    #[test]
    fn non_automatic_trigger_is_rejected() {
        let record = ProcessRecord::new("clock", ProcessKind::Stepper)
            .with_trigger_mode(TriggerMode::Passive);
        assert!(Stepper::from_record(&record).is_err());
    }

    #[test]
    fn non_positive_dt_is_rejected() {
        for dt in [0.0, -1.0, f64::NAN] {
            let record = ProcessRecord::new("clock", ProcessKind::Stepper).with_dt(dt);
            assert!(Stepper::from_record(&record).is_err(), "dt {dt}");
        }
    }
}
