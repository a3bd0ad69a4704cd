//! Run results: the interchange format consumed by reporters.
//!
//! Field names are part of the output contract — reporters and downstream
//! tooling parse `results.json` — so renames here are breaking changes.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuiteResult {
    pub passed: bool,
    pub scenarios: Vec<ScenarioResult>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    /// Set once the teardown phase has run, whether or not steps executed.
    pub teardown_ran: bool,
    pub steps: Vec<StepResult>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StepResult {
    #[serde(default)]
    pub name: String,
    pub passed: bool,
    /// 0 when no response was received (transport failure or guard).
    pub status_code: u16,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Measured around the HTTP call only, not hooks or expectations.
    pub duration_ms: f64,

    pub method: String,
    pub url: String,
    #[serde(default)]
    pub req_headers: HashMap<String, String>,
    #[serde(default)]
    pub req_body: String,
    #[serde(default)]
    pub resp_headers: HashMap<String, Vec<String>>,
    /// Capped at 64 KiB for reporting; validators see the full bytes.
    #[serde(default)]
    pub resp_body: String,
}

impl Default for SuiteResult {
    fn default() -> Self {
        Self {
            passed: true,
            scenarios: Vec::new(),
            duration_ms: 0.0,
        }
    }
}

/// JSON Schema for the result interchange format.
#[must_use]
pub fn result_schema() -> String {
    let schema = schemars::schema_for!(SuiteResult);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SuiteResult {
        SuiteResult {
            passed: false,
            scenarios: vec![ScenarioResult {
                name: "S1".into(),
                passed: false,
                teardown_ran: true,
                steps: vec![StepResult {
                    name: String::new(),
                    passed: false,
                    status_code: 200,
                    errors: vec!["status: got 200, want 418".into()],
                    duration_ms: 12.0,
                    method: "GET".into(),
                    url: "http://x/fail".into(),
                    ..StepResult::default()
                }],
                duration_ms: 15.0,
            }],
            duration_ms: 20.0,
        }
    }

    #[test]
    fn json_field_names_are_stable() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["passed"], false);
        let sc = &json["scenarios"][0];
        assert_eq!(sc["teardown_ran"], true);
        let st = &sc["steps"][0];
        assert_eq!(st["status_code"], 200);
        assert_eq!(st["duration_ms"], 12.0);
        assert!(st.get("resp_body").is_some());
    }

    #[test]
    fn roundtrip_through_json() {
        let res = sample();
        let bytes = serde_json::to_vec(&res).unwrap();
        let back: SuiteResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.scenarios[0].steps[0].errors, res.scenarios[0].steps[0].errors);
    }

    #[test]
    fn schema_generation_produces_valid_json() {
        let schema = result_schema();
        let parsed: serde_json::Value = serde_json::from_str(&schema).unwrap();
        assert_eq!(
            parsed.get("title").and_then(|v| v.as_str()),
            Some("SuiteResult")
        );
    }
}
