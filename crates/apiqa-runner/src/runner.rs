//! Suite and scenario execution.
//!
//! A scenario owns a clone of the base variables, which is what makes the
//! worker pool safe: no state is shared between scenarios except the
//! coverage set, which is mutex-guarded and commutative.

use std::collections::HashMap;
use std::collections::BTreeSet;
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::Instant;

use apiqa_core::{
    Action, HookPhase, Request, Scenario, ScenarioResult, Step, StepResult, SuiteResult,
    TestSuite, VarMap, find_unresolved, interpolate, walk_interpolate,
};

use crate::cancel::CancelToken;
use crate::contract::Validator;
use crate::expect::{self, CoverageSet, ResponseContext};
use crate::hook::{self, HookInput, RequestPatch, ResponseView};
use crate::http::{HttpError, HttpInvoker};

/// Response bodies are capped at 64 KiB in reports; validators and hooks
/// always see the full bytes.
const REPORT_BODY_CAP: usize = 64 << 10;

pub struct Runner {
    invoker: HttpInvoker,
    base_vars: VarMap,
    validator: Option<Validator>,
    coverage: CoverageSet,
    parallel: usize,
    fail_fast: bool,
}

impl Runner {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, HttpError> {
        Ok(Self {
            invoker: HttpInvoker::new()?,
            base_vars: VarMap::new(),
            validator: None,
            coverage: CoverageSet::default(),
            parallel: 1,
            fail_fast: false,
        })
    }

    /// Base variables cloned into every scenario.
    #[must_use]
    pub fn with_vars(mut self, vars: VarMap) -> Self {
        self.base_vars = vars;
        self
    }

    /// Attach an OpenAPI validator; `contract` expectations require one.
    #[must_use]
    pub fn with_contract(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    /// Stop after the first failing scenario. Forces sequential execution:
    /// with a pool, "first failure" would be a race.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Union of coverage observed so far: method → templated paths.
    #[must_use]
    pub fn covered(&self) -> HashMap<String, BTreeSet<String>> {
        self.coverage.snapshot()
    }

    /// Execute the whole suite. Result indices correspond 1:1 to declared
    /// scenario indices; under fail-fast the vector is truncated to the
    /// failing prefix.
    pub fn run_suite(&self, cancel: &CancelToken, suite: &TestSuite) -> SuiteResult {
        let start = Instant::now();
        let parallel = if self.fail_fast { 1 } else { self.parallel };

        let scenarios = if parallel <= 1 {
            let mut out = Vec::with_capacity(suite.scenarios.len());
            for sc in &suite.scenarios {
                let res = self.run_scenario(cancel, sc);
                let failed = !res.passed;
                out.push(res);
                if self.fail_fast && failed {
                    break;
                }
            }
            out
        } else {
            self.run_pool(cancel, suite, parallel)
        };

        SuiteResult {
            passed: scenarios.iter().all(|sc| sc.passed),
            scenarios,
            duration_ms: ms_since(start),
        }
    }

    /// Worker pool: exactly `parallel` workers consume scenarios from one
    /// queue; the collector writes each result back at its original index.
    fn run_pool(
        &self,
        cancel: &CancelToken,
        suite: &TestSuite,
        parallel: usize,
    ) -> Vec<ScenarioResult> {
        let mut slots: Vec<Option<ScenarioResult>> = Vec::new();
        slots.resize_with(suite.scenarios.len(), || None);

        let (job_tx, job_rx) = mpsc::channel::<(usize, &Scenario)>();
        let job_rx = Mutex::new(job_rx);
        let (res_tx, res_rx) = mpsc::channel::<(usize, ScenarioResult)>();

        thread::scope(|scope| {
            for _ in 0..parallel {
                let res_tx = res_tx.clone();
                let job_rx = &job_rx;
                scope.spawn(move || {
                    loop {
                        let job = job_rx.lock().expect("job queue poisoned").recv();
                        let Ok((idx, sc)) = job else { break };
                        let _ = res_tx.send((idx, self.run_scenario(cancel, sc)));
                    }
                });
            }
            drop(res_tx);

            for job in suite.scenarios.iter().enumerate() {
                let _ = job_tx.send(job);
            }
            drop(job_tx);

            for (idx, res) in res_rx {
                slots[idx] = Some(res);
            }
        });

        slots.into_iter().flatten().collect()
    }

    fn run_scenario(&self, cancel: &CancelToken, sc: &Scenario) -> ScenarioResult {
        let start = Instant::now();

        let mut vars = self.base_vars.clone();
        vars.insert("uuid".into(), scenario_token());
        vars.insert(
            "now".into(),
            chrono::Utc::now()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );

        let mut res = ScenarioResult {
            name: sc.name.clone(),
            passed: true,
            teardown_ran: false,
            steps: Vec::with_capacity(sc.steps.len()),
            duration_ms: 0.0,
        };

        // Setup failures mark the scenario failed but steps still run, so a
        // broken fixture shows the downstream failures in the same report.
        if let Err(e) = self.run_actions(cancel, &sc.setup, &vars) {
            tracing::warn!(scenario = %sc.name, error = %e, "setup failed");
            res.passed = false;
        }

        for step in &sc.steps {
            let step_res = self.run_step(cancel, step, &mut vars);
            if !step_res.passed {
                res.passed = false;
            }
            res.steps.push(step_res);
        }

        // Teardown errors never invert the scenario outcome.
        if let Err(e) = self.run_actions(cancel, &sc.teardown, &vars) {
            tracing::warn!(scenario = %sc.name, error = %e, "teardown error ignored");
        }
        res.teardown_ran = true;
        res.duration_ms = ms_since(start);
        res
    }

    fn run_actions(
        &self,
        cancel: &CancelToken,
        actions: &[Action],
        vars: &VarMap,
    ) -> Result<(), HttpError> {
        for action in actions {
            let Some(req) = &action.request else { continue };
            self.invoker.send(&expand_request(req, vars), cancel)?;
        }
        Ok(())
    }

    fn run_step(&self, cancel: &CancelToken, step: &Step, vars: &mut VarMap) -> StepResult {
        let mut res = StepResult {
            name: step.name.clone().unwrap_or_default(),
            passed: true,
            ..StepResult::default()
        };
        let mut req = expand_request(&step.request, vars);

        for hk in step.hooks.iter().filter(|h| h.when == HookPhase::Before) {
            let input = HookInput {
                vars: vars.clone(),
                request: Some(req.clone()),
                response: None,
            };
            match hook::run_process_hook(cancel, HookPhase::Before, hk, &input) {
                Err(e) => {
                    res.passed = false;
                    res.errors.push(format!("hook(before) error: {e}"));
                }
                Ok(out) => {
                    merge_vars(vars, out.vars);
                    if let Some(patch) = out.request {
                        apply_patch(&mut req, patch);
                    }
                    if !out.errors.is_empty() {
                        res.passed = false;
                        res.errors.extend(out.errors);
                    }
                }
            }
        }

        // Snapshot after hooks so the report shows what actually went out.
        res.method = req.method.clone();
        res.url = req.url.clone();
        res.req_headers = req.headers.clone();
        res.req_body = stringify_body(req.body.as_ref());

        let unresolved = find_unresolved(&req.url);
        if !unresolved.is_empty() {
            res.passed = false;
            res.errors.push(format!(
                "unresolved variables in URL: {} (define via --env or use ${{VAR|default}})",
                unresolved.join(", ")
            ));
            return res;
        }

        let started = Instant::now();
        let outcome = self.invoker.send(&req, cancel);
        res.duration_ms = ms_since(started);

        let (status, resp_headers, body) = match outcome {
            Ok(resp) => (resp.status, resp.headers, resp.body),
            Err(e) => {
                res.passed = false;
                res.errors.push(format!("request error: {e}"));
                (0, HashMap::new(), Vec::new())
            }
        };
        res.status_code = status;
        res.resp_headers = resp_headers.clone();
        res.resp_body = limit_body(&body, REPORT_BODY_CAP);

        for hk in step.hooks.iter().filter(|h| h.when == HookPhase::After) {
            let input = HookInput {
                vars: vars.clone(),
                request: Some(req.clone()),
                response: Some(ResponseView::new(status, resp_headers.clone(), &body)),
            };
            match hook::run_process_hook(cancel, HookPhase::After, hk, &input) {
                Err(e) => {
                    res.passed = false;
                    res.errors.push(format!("hook(after) error: {e}"));
                }
                Ok(out) => {
                    merge_vars(vars, out.vars);
                    if !out.errors.is_empty() {
                        res.passed = false;
                        res.errors.extend(out.errors);
                    }
                }
            }
        }

        // Best-effort JSON parse; a non-JSON body is not itself an error.
        let json_body = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            });

        let ctx = ResponseContext {
            status,
            json_body: json_body.as_ref(),
            vars: &*vars,
            method: &req.method,
            url: &req.url,
            resp_headers: &resp_headers,
            raw_body: &body,
        };
        for exp in &step.expect {
            if let Err(msg) = expect::evaluate(exp, &ctx, self.validator.as_ref(), &self.coverage) {
                res.passed = false;
                res.errors.push(msg);
            }
        }

        res
    }
}

/// Interpolate URL, header values, and body string leaves; upper-case the
/// method. The method itself is never interpolated.
fn expand_request(req: &Request, vars: &VarMap) -> Request {
    Request {
        method: req.method.to_uppercase(),
        url: interpolate(&req.url, vars),
        headers: req
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), interpolate(v, vars)))
            .collect(),
        body: req.body.as_ref().map(|b| walk_interpolate(b, vars)),
        timeout_ms: req.timeout_ms,
    }
}

/// Hook-returned variables overwrite, but empty-string values are ignored.
fn merge_vars(vars: &mut VarMap, additions: VarMap) {
    for (k, v) in additions {
        if !v.is_empty() {
            vars.insert(k, v);
        }
    }
}

fn apply_patch(req: &mut Request, patch: RequestPatch) {
    if !patch.url.is_empty() {
        req.url = patch.url;
    }
    if !patch.method.is_empty() {
        req.method = patch.method.to_uppercase();
    }
    for (k, v) in patch.headers {
        req.headers.insert(k, v);
    }
    if let Some(body) = patch.body {
        req.body = Some(body);
    }
}

fn stringify_body(body: Option<&serde_json::Value>) -> String {
    match body {
        None => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(value) => serde_json::to_string_pretty(value)
            .unwrap_or_else(|_| value.to_string()),
    }
}

fn limit_body(body: &[u8], cap: usize) -> String {
    if body.len() <= cap {
        return String::from_utf8_lossy(body).into_owned();
    }
    let mut out = String::from_utf8_lossy(&body[..cap]).into_owned();
    out.push_str("\n...[truncated]...");
    out
}

fn scenario_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
