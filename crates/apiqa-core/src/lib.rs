//! apiqa-core: suite model, variable store, and result types
//!
//! This crate provides the declarative description of a test run (suites,
//! scenarios, steps, expectations, hooks), strict document parsing, the
//! `${KEY|default}` variable store, and the result/coverage interchange
//! types that reporters consume.

pub mod coverage;
pub mod parser;
pub mod result;
pub mod suite;
pub mod vars;

pub use coverage::CoverageReport;
pub use parser::{ParseError, parse_bytes};
pub use result::{ScenarioResult, StepResult, SuiteResult, result_schema};
pub use suite::{
    Action, ExpectKind, Expectation, Hook, HookKind, HookPhase, Request, Scenario, Step, TestSuite,
};
pub use vars::{
    VarMap, VarsError, canonical_string, find_unresolved, interpolate, load_json_files,
    walk_interpolate,
};
