//! apiqa-runner: scenario execution engine and OpenAPI contract tooling
//!
//! Executes suites against a live HTTP endpoint: variable expansion,
//! subprocess hooks around each step, per-request timeouts, expectation
//! evaluation with contract validation and coverage accounting, guaranteed
//! teardown, and sequential or pooled scheduling. Also hosts the
//! operation-level contract differ.

pub mod cancel;
pub mod contract;
pub mod expect;
pub mod hook;
pub mod http;
pub mod runner;

pub use cancel::CancelToken;
pub use contract::diff::{DiffReport, OpSig, StatusChange, diff_documents};
pub use contract::{ContractError, Validator};
pub use expect::CoverageSet;
pub use hook::{HookError, HookInput, HookOutput, RequestPatch, ResponseView, run_process_hook};
pub use http::{HttpError, HttpInvoker, HttpResponse};
pub use runner::Runner;
