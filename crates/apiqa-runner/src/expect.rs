//! Expectation evaluation: status, top-level JSON field equality, contract.
//!
//! Every expectation of a step is evaluated even after failures; the caller
//! accumulates the messages so one run surfaces every problem.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use serde_json::Value;

use apiqa_core::{ExpectKind, Expectation, VarMap, canonical_string, interpolate};

use crate::contract::Validator;

/// Coverage observed by `contract` expectations: method → templated paths.
/// The one piece of engine-wide mutable state; insertion is commutative so
/// interleaving between parallel scenarios is safe.
#[derive(Debug, Default)]
pub struct CoverageSet {
    inner: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl CoverageSet {
    pub fn record(&self, method: &str, path: &str) {
        let mut inner = self.inner.lock().expect("coverage mutex poisoned");
        inner
            .entry(method.to_string())
            .or_default()
            .insert(path.to_string());
    }

    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, BTreeSet<String>> {
        self.inner.lock().expect("coverage mutex poisoned").clone()
    }
}

/// Everything a single expectation can look at.
pub(crate) struct ResponseContext<'a> {
    pub status: u16,
    /// Parsed response body, when it parsed as a JSON object.
    pub json_body: Option<&'a serde_json::Map<String, Value>>,
    pub vars: &'a VarMap,
    pub method: &'a str,
    pub url: &'a str,
    pub resp_headers: &'a HashMap<String, Vec<String>>,
    pub raw_body: &'a [u8],
}

pub(crate) fn evaluate(
    exp: &Expectation,
    ctx: &ResponseContext<'_>,
    validator: Option<&Validator>,
    coverage: &CoverageSet,
) -> Result<(), String> {
    match exp.kind {
        ExpectKind::Status => eval_status(exp, ctx),
        ExpectKind::JsonPath => eval_json_field(exp, ctx),
        ExpectKind::Contract => eval_contract(ctx, validator, coverage),
    }
}

fn eval_status(exp: &Expectation, ctx: &ResponseContext<'_>) -> Result<(), String> {
    let Some(want) = exp.value.as_ref().and_then(value_as_int) else {
        return Err("status expectation has non-integer value".into());
    };
    if i64::from(ctx.status) != want {
        return Err(format!("status: got {}, want {want}", ctx.status));
    }
    Ok(())
}

/// Top-level field equality only. String expected values are interpolated
/// against the scenario variables; both sides compare by canonical string
/// form so `201` matches `"201"`.
fn eval_json_field(exp: &Expectation, ctx: &ResponseContext<'_>) -> Result<(), String> {
    let target = exp.target.as_deref().unwrap_or("");
    let field = target.strip_prefix("$.").unwrap_or(target);

    let got = ctx
        .json_body
        .and_then(|body| body.get(field))
        .ok_or_else(|| format!("jsonPath: {target} not found"))?;

    let want = match &exp.value {
        Some(Value::String(s)) => Value::String(interpolate(s, ctx.vars)),
        Some(other) => other.clone(),
        None => Value::Null,
    };

    let (got_s, want_s) = (canonical_string(got), canonical_string(&want));
    if got_s != want_s {
        return Err(format!("jsonPath {target}: got {got_s}, want {want_s}"));
    }
    Ok(())
}

fn eval_contract(
    ctx: &ResponseContext<'_>,
    validator: Option<&Validator>,
    coverage: &CoverageSet,
) -> Result<(), String> {
    let Some(validator) = validator else {
        return Err("contract: requested but no OpenAPI spec configured".into());
    };
    match validator.validate_response(ctx.method, ctx.url, ctx.status, ctx.resp_headers, ctx.raw_body)
    {
        Ok((path, method)) => {
            coverage.record(&method, &path);
            Ok(())
        }
        Err(e) => Err(format!("contract: {e}")),
    }
}

fn value_as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
