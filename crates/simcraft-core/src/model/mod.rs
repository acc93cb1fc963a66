//! Declarative model surfaces.
//!
//! Two surfaces lower to the same [`Model`]: a YAML document and an inline
//! block DSL ([`dsl`]). Both produce identical kernel inputs for equivalent
//! models; [`Model::to_yaml`] emits a form that parses back equivalent.

pub mod dsl;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionRecord;
use crate::error::{Result, SimulationError};
use crate::process::ProcessRecord;

/// A declarative model: metadata plus the wire records the kernel accepts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Model {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl Model {
    /// Parse the YAML surface.
    pub fn from_yaml(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse the inline block DSL.
    pub fn from_dsl(input: &str) -> Result<Self> {
        dsl::parse(input)
    }

    /// Load a model file, dispatching on extension: `.yaml`/`.yml` parse as
    /// YAML, anything else as the inline DSL.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| SimulationError::ParseError(format!("{}: {err}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            _ => Self::from_dsl(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessKind, TriggerMode};

    const YAML: &str = r#"
name: faucet
processes:
  - id: source1
    type: Source
  - id: pool1
    type: Pool
    capacity: 3
    overflow: Block
  - id: stepper
    type: Stepper
connections:
  - id: c1
    sourceID: source1
    targetID: pool1
    flowRate: 2.0
"#;

    #[test]
    fn yaml_parses_records() {
        let model = Model::from_yaml(YAML).unwrap();
        assert_eq!(model.name.as_deref(), Some("faucet"));
        assert_eq!(model.processes.len(), 3);
        assert_eq!(model.processes[1].kind, ProcessKind::Pool);
        assert_eq!(model.processes[1].capacity, Some(3.0));
        assert_eq!(model.connections[0].flow_rate, Some(2.0));
    }

    #[test]
    fn yaml_round_trips_equivalent() {
        let model = Model::from_yaml(YAML).unwrap();
        let reparsed = Model::from_yaml(&model.to_yaml().unwrap()).unwrap();
        assert_eq!(model, reparsed);
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        let err = Model::from_yaml("panels: []\n").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn unknown_process_fields_are_rejected() {
        let input = "processes:\n  - id: a\n    type: Pool\n    volume: 2\n";
        assert!(Model::from_yaml(input).is_err());
    }

    #[test]
    fn load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("model.yaml");
        std::fs::write(&yaml_path, YAML).unwrap();
        let model = Model::load(&yaml_path).unwrap();
        assert_eq!(model.processes.len(), 3);

        let dsl_path = dir.path().join("model.sim");
        std::fs::write(
            &dsl_path,
            r#"processes { source "s1" {} pool "p1" {} } connections { "s1.out" -> "p1.in" {} }"#,
        )
        .unwrap();
        let model = Model::load(&dsl_path).unwrap();
        assert_eq!(model.processes.len(), 2);
        assert_eq!(model.connections.len(), 1);
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let err = Model::load("/nonexistent/model.yaml").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn dsl_and_yaml_lower_identically() {
        let yaml = r#"
processes:
  - id: s1
    type: Source
    trigger_mode: Passive
  - id: p1
    type: Pool
    capacity: 5
connections:
  - id: c1
    sourceID: s1
    targetID: p1
    flowRate: 2.0
"#;
        let dsl = r#"
processes {
    source "s1" { trigger_mode: Passive }
    pool "p1" { capacity: 5 }
}
connections {
    "s1.out" -> "p1.in" { id: "c1", flow_rate: 2.0 }
}
"#;
        let from_yaml = Model::from_yaml(yaml).unwrap();
        let from_dsl = Model::from_dsl(dsl).unwrap();
        assert_eq!(from_yaml.processes, from_dsl.processes);
        assert_eq!(from_yaml.connections, from_dsl.connections);
        assert_eq!(
            from_dsl.processes[0].trigger_mode,
            Some(TriggerMode::Passive)
        );
    }
}
