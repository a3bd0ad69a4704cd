//! Subprocess hook runner.
//!
//! A hook is a child process speaking JSON over pipes: exactly one object on
//! stdin, exactly one on stdout. The pipe protocol is the ABI users write
//! hooks against, so the field names here are load-bearing.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use apiqa_core::{Hook, HookPhase, Request, VarMap};

use crate::cancel::CancelToken;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Document written to the hook's stdin. `request` is present for `before`
/// hooks, `response` for `after` hooks.
#[derive(Debug, Clone, Serialize)]
pub struct HookInput {
    pub vars: VarMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseView>,
}

/// Observed response as shown to `after` hooks. The body is the raw bytes
/// re-encoded as a JSON value: embedded JSON when the body parses, a string
/// otherwise. Hooks must treat it as opaque.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub status: u16,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Vec<String>>,
    pub body: serde_json::Value,
}

impl ResponseView {
    #[must_use]
    pub fn new(status: u16, headers: HashMap<String, Vec<String>>, body: &[u8]) -> Self {
        let body = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(body).into_owned()),
        };
        Self {
            status,
            headers,
            body,
        }
    }
}

/// Document read from the hook's stdout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookOutput {
    /// Merged into the scenario variables; empty-string values are skipped.
    #[serde(default)]
    pub vars: VarMap,
    /// Honored only for `before` hooks.
    #[serde(default)]
    pub request: Option<RequestPatch>,
    /// Appended to the step's errors; any entry forces the step to fail.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Reserved for logging redaction.
    #[serde(default)]
    pub redact: Vec<String>,
}

/// Partial request replacement emitted by a `before` hook. Empty strings
/// mean "no change"; headers are merged into the request, not replaced.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestPatch {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("start: {0}")]
    Start(String),
    #[error("encode stdin: {0}")]
    EncodeStdin(String),
    #[error("decode stdout: {0}")]
    DecodeStdout(String),
    #[error("hook exit: {0}")]
    Exit(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Run one process hook: spawn, feed stdin, drain stdout, wait with a
/// timeout enforced by killing the child.
///
/// Request patches from phases other than `before` are discarded here so
/// callers cannot apply them by mistake.
///
/// # Errors
///
/// Non-zero exit, stdin/stdout I/O failures, undecodable output, timeout,
/// and cancellation are all errors; the caller records them as step
/// failures and keeps running the remaining hooks of the step.
pub fn run_process_hook(
    cancel: &CancelToken,
    phase: HookPhase,
    hook: &Hook,
    input: &HookInput,
) -> Result<HookOutput, HookError> {
    let timeout = if hook.timeout_ms > 0 {
        Duration::from_millis(hook.timeout_ms as u64)
    } else {
        DEFAULT_TIMEOUT
    };
    let timeout = cancel.clamp(timeout);

    let mut child = Command::new(&hook.cmd)
        .args(&hook.args)
        .envs(&hook.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| HookError::Start(e.to_string()))?;

    let payload = serde_json::to_vec(input).map_err(|e| HookError::EncodeStdin(e.to_string()))?;

    // Feed stdin and drain stdout on their own threads so a hook that never
    // reads, or that writes more than a pipe buffer, cannot deadlock against
    // the timeout loop below.
    let stdin = child.stdin.take();
    let writer = thread::spawn(move || -> Result<(), String> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&payload).map_err(|e| e.to_string())?;
        }
        Ok(())
    });
    let mut stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut out) = stdout {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(HookError::Cancelled);
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(HookError::Timeout(timeout));
                }
                thread::sleep(WAIT_POLL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(HookError::Start(e.to_string()));
            }
        }
    };

    let output_bytes = reader.join().unwrap_or_default();
    let write_result = writer.join().unwrap_or_else(|_| Err("writer panicked".into()));
    let decoded: Result<HookOutput, _> = serde_json::from_slice(&output_bytes);

    // A non-zero exit is the root cause even when stdout is garbage or the
    // hook never read its input.
    if !status.success() {
        return Err(HookError::Exit(status.to_string()));
    }
    if let Err(e) = write_result {
        return Err(HookError::EncodeStdin(e));
    }
    let mut out = decoded.map_err(|e| HookError::DecodeStdout(e.to_string()))?;

    if phase != HookPhase::Before {
        out.request = None;
    }
    Ok(out)
}
