//! Variable store: `${KEY|default}` interpolation and env-file loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Flat name→value mapping. Each scenario owns its own clone.
pub type VarMap = HashMap<String, String>;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("var pattern is valid"));

/// Substitute `${KEY}` / `${KEY|default}` tokens in a string.
///
/// A key present with a non-empty value wins; otherwise the default after
/// `|` is used; otherwise the literal token is left untouched so the
/// unresolved-variable guard can name it precisely.
pub fn interpolate(s: &str, vars: &VarMap) -> String {
    VAR_PATTERN
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let inner = &caps[1];
            let (key, default) = match inner.split_once('|') {
                Some((k, d)) => (k, d),
                None => (inner, ""),
            };
            match vars.get(key) {
                Some(v) if !v.is_empty() => v.clone(),
                _ if !default.is_empty() => default.to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Interpolate every string leaf of a structured value, recursing through
/// mappings and lists. Non-string scalars are untouched.
pub fn walk_interpolate(value: &serde_json::Value, vars: &VarMap) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(interpolate(s, vars)),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), walk_interpolate(v, vars)))
                .collect(),
        ),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|v| walk_interpolate(v, vars)).collect(),
        ),
        other => other.clone(),
    }
}

/// Remaining `${KEY}` tokens that had no default. Tokens with a default are
/// never reported: interpolation already consumed them.
pub fn find_unresolved(s: &str) -> Vec<String> {
    VAR_PATTERN
        .captures_iter(s)
        .filter_map(|caps| {
            let inner = &caps[1];
            if inner.contains('|') {
                None
            } else {
                Some(format!("${{{inner}}}"))
            }
        })
        .collect()
}

/// Canonical string form of a JSON value, used both for env-file coercion
/// and for expectation comparison (`201` and `"201"` compare equal).
pub fn canonical_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VarsError {
    #[error("read {0}: {1}")]
    Io(PathBuf, String),
    #[error("parse {0}: {1}")]
    Parse(PathBuf, String),
}

/// Load one or more flat JSON env files. Non-string values are coerced to
/// canonical string form; later files override earlier ones.
///
/// # Errors
///
/// Returns an error when a file cannot be read or is not a JSON object.
pub fn load_json_files<P: AsRef<Path>>(paths: &[P]) -> Result<VarMap, VarsError> {
    let mut out = VarMap::new();
    for p in paths {
        let path = p.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| VarsError::Io(path.to_path_buf(), e.to_string()))?;
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| VarsError::Parse(path.to_path_buf(), e.to_string()))?;
        for (k, v) in map {
            out.insert(k, canonical_string(&v));
        }
    }
    Ok(out)
}
