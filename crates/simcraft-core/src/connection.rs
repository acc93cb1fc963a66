//! Typed directed edges between process ports.
//!
//! Connections hold no state. They are a lookup structure the kernel
//! resolves at delivery time, which is what allows processes to be removed
//! mid-simulation without invalidating anything.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Default output port name.
pub const DEFAULT_OUTPUT_PORT: &str = "out";
/// Default input port name.
pub const DEFAULT_INPUT_PORT: &str = "in";
/// Default connection weight.
pub const DEFAULT_FLOW_RATE: f64 = 1.0;

/// Connection wire form. Ports default to `"out"` and `"in"`, `flowRate`
/// to 1.0. Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionRecord {
    pub id: String,
    #[serde(rename = "sourceID")]
    pub source_id: String,
    #[serde(rename = "sourcePort", default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(rename = "targetID")]
    pub target_id: String,
    #[serde(rename = "targetPort", default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
    #[serde(rename = "flowRate", default, skip_serializing_if = "Option::is_none")]
    pub flow_rate: Option<f64>,
}

impl ConnectionRecord {
    /// A record with both ports and the flow rate left to their defaults.
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            source_port: None,
            target_id: target_id.into(),
            target_port: None,
            flow_rate: None,
        }
    }

    /// Set the flow rate.
    pub fn with_flow_rate(mut self, flow_rate: f64) -> Self {
        self.flow_rate = Some(flow_rate);
        self
    }
}

/// An installed connection, defaults resolved and weight validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: String,
    pub source_id: String,
    pub source_port: String,
    pub target_id: String,
    pub target_port: String,
    /// Positive edge weight. Rate of transfer per tick for Source/Pool
    /// outputs; delay duration for Delay outputs.
    pub flow_rate: f64,
}

impl Connection {
    /// Resolve a wire record, validating the id and the weight.
    pub fn from_record(record: &ConnectionRecord) -> Result<Self> {
        if record.id.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "connection id must not be empty".into(),
            ));
        }
        let flow_rate = record.flow_rate.unwrap_or(DEFAULT_FLOW_RATE);
        if !flow_rate.is_finite() || flow_rate <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "connection {:?}: flowRate must be a positive real, got {flow_rate}",
                record.id
            )));
        }
        Ok(Self {
            id: record.id.clone(),
            source_id: record.source_id.clone(),
            source_port: record
                .source_port
                .clone()
                .unwrap_or_else(|| DEFAULT_OUTPUT_PORT.to_string()),
            target_id: record.target_id.clone(),
            target_port: record
                .target_port
                .clone()
                .unwrap_or_else(|| DEFAULT_INPUT_PORT.to_string()),
            flow_rate,
        })
    }

    /// Wire form of this connection. Default ports round-trip as `None`.
    pub fn to_record(&self) -> ConnectionRecord {
        ConnectionRecord {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            source_port: (self.source_port != DEFAULT_OUTPUT_PORT)
                .then(|| self.source_port.clone()),
            target_id: self.target_id.clone(),
            target_port: (self.target_port != DEFAULT_INPUT_PORT)
                .then(|| self.target_port.clone()),
            flow_rate: (self.flow_rate != DEFAULT_FLOW_RATE).then_some(self.flow_rate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_and_rate_default() {
        let conn = Connection::from_record(&ConnectionRecord::new("c1", "a", "b")).unwrap();
        assert_eq!(conn.source_port, "out");
        assert_eq!(conn.target_port, "in");
        assert_eq!(conn.flow_rate, 1.0);
    }

    #[test]
    fn zero_and_negative_rates_are_rejected() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let record = ConnectionRecord::new("c1", "a", "b").with_flow_rate(rate);
            assert!(Connection::from_record(&record).is_err(), "rate {rate}");
        }
    }

    #[test]
    fn record_round_trips_defaults_as_none() {
        let conn = Connection::from_record(&ConnectionRecord::new("c1", "a", "b")).unwrap();
        let record = conn.to_record();
        assert_eq!(record.source_port, None);
        assert_eq!(record.target_port, None);
        assert_eq!(record.flow_rate, None);
        assert_eq!(Connection::from_record(&record).unwrap(), conn);
    }

    #[test]
    fn wire_form_uses_camel_case_keys() {
        let record = ConnectionRecord::new("c1", "a", "b").with_flow_rate(2.0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sourceID"], "a");
        assert_eq!(json["targetID"], "b");
        assert_eq!(json["flowRate"], 2.0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<ConnectionRecord>(
            r#"{"id": "c1", "sourceID": "a", "targetID": "b", "speed": 3}"#,
        );
        assert!(err.is_err());
    }
}
