//! Event records exchanged between processes.

use serde::{Deserialize, Serialize};

/// What an event carries.
///
/// Serializes as a tagged map, e.g. `{"type": "transfer", "amount": 1.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Payload {
    /// A resource transfer of `amount` units.
    Transfer { amount: f64 },
    /// A receiver-initiated request for up to `amount` units from the
    /// upstream end of a connection.
    PullRequest { amount: f64 },
    /// A Delay's self-addressed queue-release marker.
    Release,
    /// An externally injected command for an Interactive process.
    Trigger,
}

/// A message between processes at a simulated time.
///
/// Events are value records: the kernel owns pending events exclusively and
/// hands delivered events back to callers as copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<String>,
    /// Simulated time at which the event is due.
    pub time: f64,
    pub payload: Payload,
}

impl Event {
    /// A resource transfer due at `time`.
    pub fn transfer(
        source_id: impl Into<String>,
        source_port: impl Into<String>,
        target_id: impl Into<String>,
        target_port: impl Into<String>,
        time: f64,
        amount: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_port: Some(source_port.into()),
            target_id: target_id.into(),
            target_port: Some(target_port.into()),
            time,
            payload: Payload::Transfer { amount },
        }
    }

    /// A pull request due at `time`, addressed to the upstream end of a
    /// connection.
    pub fn pull_request(
        source_id: impl Into<String>,
        source_port: impl Into<String>,
        target_id: impl Into<String>,
        target_port: impl Into<String>,
        time: f64,
        amount: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_port: Some(source_port.into()),
            target_id: target_id.into(),
            target_port: Some(target_port.into()),
            time,
            payload: Payload::PullRequest { amount },
        }
    }

    /// The transferred amount, or 0.0 for control payloads.
    pub fn amount(&self) -> f64 {
        match self.payload {
            Payload::Transfer { amount } => amount,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_amount_is_visible() {
        let ev = Event::transfer("a", "out", "b", "in", 1.0, 2.5);
        assert_eq!(ev.amount(), 2.5);
        assert_eq!(ev.source_port.as_deref(), Some("out"));
    }

    #[test]
    fn control_payloads_have_zero_amount() {
        let ev = Event {
            source_id: "a".into(),
            source_port: None,
            target_id: "b".into(),
            target_port: None,
            time: 0.0,
            payload: Payload::Trigger,
        };
        assert_eq!(ev.amount(), 0.0);
    }

    #[test]
    fn payload_serializes_as_tagged_map() {
        let json = serde_json::to_value(Payload::Transfer { amount: 1.0 }).unwrap();
        assert_eq!(json["type"], "transfer");
        assert_eq!(json["amount"], 1.0);
    }
}
