//! Suite model: the immutable description of what a run executes.
//!
//! These types mirror the suite document format exactly. Decoding is strict:
//! unknown fields are rejected so a typo in a suite file fails loudly instead
//! of silently dropping an expectation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level test document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSuite {
    pub name: String,
    /// Optional OpenAPI spec path, resolved relative to the suite file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openapi: Option<String>,
    pub scenarios: Vec<Scenario>,
}

/// An ordered group of steps sharing setup, teardown, and variable scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<Action>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<Action>,
}

/// A setup/teardown action: a bare request with no expectations or hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
}

/// A single HTTP request plus its expectations and hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub request: Request,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<Expectation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
}

/// HTTP request description. The URL and header values may contain `${…}`
/// placeholders; the method is normalized to upper case at parse time and
/// again after expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Absent, a string (sent verbatim), or a structured value (sent as JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Defaults to 10 000 when absent or non-positive.
    #[serde(default, rename = "timeout_ms", skip_serializing_if = "is_zero")]
    pub timeout_ms: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// A check performed against a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    #[serde(rename = "type")]
    pub kind: ExpectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectKind {
    /// Exact equality against the observed HTTP status.
    #[serde(rename = "status")]
    Status,
    /// Top-level field equality against the JSON response body. The name is
    /// historical: only `$.field` targets are supported, no nested paths.
    #[serde(rename = "jsonPath")]
    JsonPath,
    /// OpenAPI conformance of the observed response.
    #[serde(rename = "contract")]
    Contract,
}

/// A subprocess invocation around a step, exchanging JSON over pipes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hook {
    #[serde(rename = "type")]
    pub kind: HookKind,
    pub when: HookPhase,
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Defaults to 10 000 when absent or non-positive.
    #[serde(default, rename = "timeoutMs", skip_serializing_if = "is_zero")]
    pub timeout_ms: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Reserved for logging redaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redact: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    #[serde(rename = "process")]
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookPhase {
    #[serde(rename = "before")]
    Before,
    #[serde(rename = "after")]
    After,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}
