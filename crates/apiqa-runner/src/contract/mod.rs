//! OpenAPI contract validation.
//!
//! The validator loads a 3.x document, builds a (method, path) router, and
//! checks observed responses against the declared operation: status must be
//! declared, `Content-Type` must match a declared media type whenever the
//! response declares content, and JSON bodies must conform to the schema.
//!
//! The document is held as plain JSON and walked on demand; `$ref`s are
//! resolved with a depth limit so circular schemas terminate.

pub mod diff;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Methods enumerated for routing, coverage, and diffing.
pub(crate) const METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "head", "options", "trace",
];

const MAX_REF_DEPTH: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("load: {0}")]
    Load(String),
    #[error("validate spec: {0}")]
    Invalid(String),
    #[error("parse url: {0}")]
    Url(String),
    #[error("route not found: {0}")]
    RouteNotFound(String),
    #[error("{0}")]
    Response(String),
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug)]
struct Route {
    method: String,
    template: String,
    segments: Vec<Segment>,
}

/// Read-only after construction; safe to consult from concurrent scenarios.
#[derive(Debug)]
pub struct Validator {
    document: Value,
    routes: Vec<Route>,
}

impl Validator {
    /// Load a spec from disk. External `$ref`s are resolved relative to the
    /// spec's directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed, or is not a
    /// structurally valid OpenAPI 3.x document.
    pub fn load_from_file(path: &Path) -> Result<Self, ContractError> {
        let bytes =
            std::fs::read(path).map_err(|e| ContractError::Load(format!("{}: {e}", path.display())))?;
        let mut doc = parse_document(Some(path), &bytes)?;
        inline_external_refs(&mut doc, path.parent(), 0)?;
        Self::build(doc)
    }

    /// Load a spec from memory. Only internal (`#/…`) references are
    /// resolvable without a file path.
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable or structurally invalid documents,
    /// or when the document carries external references.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
        let mut doc = parse_document(None, bytes)?;
        inline_external_refs(&mut doc, None, 0)?;
        Self::build(doc)
    }

    fn build(document: Value) -> Result<Self, ContractError> {
        validate_document(&document)?;

        let mut routes = Vec::new();
        if let Some(paths) = document.get("paths").and_then(Value::as_object) {
            for (template, item) in paths {
                for method in METHODS {
                    if item.get(method).is_some() {
                        routes.push(Route {
                            method: method.to_uppercase(),
                            template: template.clone(),
                            segments: parse_segments(template),
                        });
                    }
                }
            }
        }
        Ok(Self { document, routes })
    }

    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// All (method, templated path) pairs declared by the spec, sorted.
    #[must_use]
    pub fn operations(&self) -> Vec<(String, String)> {
        let mut ops = list_operations(&self.document);
        ops.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ops
    }

    /// Validate an observed response against the spec.
    ///
    /// Returns the (templated path, method) pair for coverage accounting.
    ///
    /// # Errors
    ///
    /// Unroutable requests, undeclared statuses, missing or mismatched
    /// `Content-Type`, unparseable JSON bodies, and schema violations all
    /// fail; the message carries the specific cause.
    pub fn validate_response(
        &self,
        method: &str,
        raw_url: &str,
        status: u16,
        headers: &HashMap<String, Vec<String>>,
        body: &[u8],
    ) -> Result<(String, String), ContractError> {
        let parsed = url::Url::parse(raw_url).map_err(|e| ContractError::Url(e.to_string()))?;
        let path = parsed.path();
        let method_up = method.to_uppercase();

        let route = self
            .find_route(&method_up, path)
            .ok_or_else(|| ContractError::RouteNotFound(format!("{method_up} {path}")))?;

        let operation = self
            .document
            .pointer(&format!(
                "/paths/{}/{}",
                escape_pointer(&route.template),
                route.method.to_lowercase()
            ))
            .ok_or_else(|| ContractError::RouteNotFound(format!("{method_up} {path}")))?;

        let responses = operation
            .get("responses")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ContractError::Response(format!(
                    "no responses declared for {method_up} {}",
                    route.template
                ))
            })?;

        let response_spec = lookup_response(responses, status).ok_or_else(|| {
            ContractError::Response(format!(
                "status {status} not declared for {method_up} {}",
                route.template
            ))
        })?;
        let response_spec = resolve_refs(response_spec, &self.document, 0);

        if let Some(content) = response_spec.get("content").and_then(Value::as_object) {
            if !content.is_empty() {
                self.validate_content(content, headers, body)?;
            }
        }

        Ok((route.template.clone(), route.method.clone()))
    }

    fn validate_content(
        &self,
        content: &serde_json::Map<String, Value>,
        headers: &HashMap<String, Vec<String>>,
        body: &[u8],
    ) -> Result<(), ContractError> {
        let declared: Vec<&str> = content.keys().map(String::as_str).collect();

        let header_value = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, vs)| vs.first());
        let Some(ct) = header_value else {
            return Err(ContractError::Response(format!(
                "missing Content-Type header, expected one of {declared:?}"
            )));
        };
        // Parameters like charset are not part of the declared media type.
        let media = ct.split(';').next().unwrap_or("").trim();

        let matched = content
            .iter()
            .find(|(key, _)| media_type_matches(key, media))
            .map(|(_, v)| v)
            .ok_or_else(|| {
                ContractError::Response(format!(
                    "unexpected Content-Type {media:?}, expected one of {declared:?}"
                ))
            })?;

        if is_json_media(media) {
            let instance: Value = serde_json::from_slice(body).map_err(|e| {
                ContractError::Response(format!("response body is not valid JSON: {e}"))
            })?;
            if let Some(schema) = matched.get("schema") {
                let schema = resolve_refs(schema, &self.document, 0);
                let validator = jsonschema::validator_for(&schema).map_err(|e| {
                    ContractError::Response(format!("invalid response schema: {e}"))
                })?;
                let errors: Vec<String> = validator
                    .iter_errors(&instance)
                    .take(5)
                    .map(|e| e.to_string())
                    .collect();
                if !errors.is_empty() {
                    return Err(ContractError::Response(format!(
                        "response body does not match schema: {}",
                        errors.join("; ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// Route a concrete path, preferring literal segments over parameters so
    /// `/users/me` beats `/users/{id}` when both are declared.
    fn find_route(&self, method: &str, path: &str) -> Option<&Route> {
        let segments: Vec<&str> = split_path(path);
        let mut best: Option<(&Route, usize)> = None;
        for route in &self.routes {
            if route.method != method || route.segments.len() != segments.len() {
                continue;
            }
            let mut literals = 0usize;
            let mut matched = true;
            for (seg, actual) in route.segments.iter().zip(&segments) {
                match seg {
                    Segment::Literal(lit) if lit == actual => literals += 1,
                    Segment::Literal(_) => {
                        matched = false;
                        break;
                    }
                    Segment::Param(_) => {}
                }
            }
            if matched && best.is_none_or(|(_, s)| literals > s) {
                best = Some((route, literals));
            }
        }
        best.map(|(r, _)| r)
    }
}

/// All (METHOD, path) pairs present in a document, unsorted.
pub(crate) fn list_operations(document: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Some(paths) = document.get("paths").and_then(Value::as_object) {
        for (path, item) in paths {
            for method in METHODS {
                if item.get(method).is_some() {
                    out.push((method.to_uppercase(), path.clone()));
                }
            }
        }
    }
    out
}

fn parse_document(path: Option<&Path>, bytes: &[u8]) -> Result<Value, ContractError> {
    let ext = path
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => serde_yml::from_slice(bytes)
            .map_err(|e| ContractError::Load(format!("invalid YAML: {e}"))),
        "json" => serde_json::from_slice(bytes)
            .map_err(|e| ContractError::Load(format!("invalid JSON: {e}"))),
        _ => {
            // Content sniffing: a leading `{` means JSON.
            let text = String::from_utf8_lossy(bytes);
            if text.trim_start().starts_with('{') {
                serde_json::from_slice(bytes)
                    .map_err(|e| ContractError::Load(format!("invalid JSON: {e}")))
            } else {
                serde_yml::from_slice(bytes)
                    .map_err(|e| ContractError::Load(format!("invalid YAML: {e}")))
            }
        }
    }
}

fn validate_document(doc: &Value) -> Result<(), ContractError> {
    let obj = doc
        .as_object()
        .ok_or_else(|| ContractError::Invalid("document is not a mapping".into()))?;

    match obj.get("openapi").and_then(Value::as_str) {
        Some(v) if v.starts_with('3') => {}
        Some(v) => {
            return Err(ContractError::Invalid(format!(
                "unsupported OpenAPI version {v:?}"
            )));
        }
        None => return Err(ContractError::Invalid("missing openapi version field".into())),
    }
    if !obj.get("info").is_some_and(Value::is_object) {
        return Err(ContractError::Invalid("missing info object".into()));
    }
    let paths = obj
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| ContractError::Invalid("missing paths object".into()))?;
    for (path, item) in paths {
        if !path.starts_with('/') {
            return Err(ContractError::Invalid(format!(
                "path {path:?} must start with '/'"
            )));
        }
        if !item.is_object() {
            return Err(ContractError::Invalid(format!(
                "path item {path:?} is not a mapping"
            )));
        }
    }
    Ok(())
}

/// Splice external `$ref`s (`other.yaml#/pointer`) into the document so the
/// rest of the validator only ever sees internal references.
fn inline_external_refs(
    value: &mut Value,
    base: Option<&Path>,
    depth: u32,
) -> Result<(), ContractError> {
    if depth > MAX_REF_DEPTH {
        return Err(ContractError::Load("reference nesting too deep".into()));
    }
    match value {
        Value::Object(obj) => {
            let external = obj
                .get("$ref")
                .and_then(Value::as_str)
                .filter(|r| !r.starts_with('#'))
                .map(str::to_string);
            if let Some(reference) = external {
                let Some(base_dir) = base else {
                    return Err(ContractError::Load(format!(
                        "external reference {reference:?} requires a file path"
                    )));
                };
                let (file, fragment) = match reference.split_once('#') {
                    Some((f, frag)) => (f, Some(frag.to_string())),
                    None => (reference.as_str(), None),
                };
                let target: PathBuf = base_dir.join(file);
                let bytes = std::fs::read(&target).map_err(|e| {
                    ContractError::Load(format!("{}: {e}", target.display()))
                })?;
                let mut loaded = parse_document(Some(&target), &bytes)?;
                inline_external_refs(&mut loaded, target.parent(), depth + 1)?;
                let resolved = match fragment {
                    Some(frag) => loaded.pointer(&frag).cloned().ok_or_else(|| {
                        ContractError::Load(format!(
                            "reference {reference:?} points nowhere in {}",
                            target.display()
                        ))
                    })?,
                    None => loaded,
                };
                *value = resolved;
                return Ok(());
            }
            // Plain traversal does not count against the depth limit; only
            // following a reference does.
            for v in obj.values_mut() {
                inline_external_refs(v, base, depth)?;
            }
        }
        Value::Array(items) => {
            for v in items {
                inline_external_refs(v, base, depth)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Resolve internal `$ref` pointers into a self-contained value, suitable
/// for `jsonschema`. Depth-limited so circular schemas terminate.
fn resolve_refs(value: &Value, document: &Value, depth: u32) -> Value {
    if depth > MAX_REF_DEPTH {
        return value.clone();
    }
    match value {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                if let Some(pointer) = reference.strip_prefix('#') {
                    if let Some(target) = document.pointer(pointer) {
                        return resolve_refs(target, document, depth + 1);
                    }
                }
                return value.clone();
            }
            Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), resolve_refs(v, document, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_refs(v, document, depth + 1))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Exact status first, then an `NXX` range key, then `default`.
fn lookup_response(responses: &serde_json::Map<String, Value>, status: u16) -> Option<&Value> {
    if let Some(spec) = responses.get(&status.to_string()) {
        return Some(spec);
    }
    let range = format!("{}XX", status / 100);
    if let Some(spec) = responses.get(&range) {
        return Some(spec);
    }
    responses.get("default")
}

fn media_type_matches(declared: &str, actual: &str) -> bool {
    if declared == actual || declared == "*/*" {
        return true;
    }
    match declared.strip_suffix("/*") {
        Some(prefix) => actual
            .split_once('/')
            .is_some_and(|(ty, _)| ty == prefix),
        None => false,
    }
}

fn is_json_media(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

fn parse_segments(template: &str) -> Vec<Segment> {
    split_path(template)
        .into_iter()
        .map(|seg| {
            if seg.starts_with('{') && seg.ends_with('}') {
                Segment::Param(seg[1..seg.len() - 1].to_string())
            } else {
                Segment::Literal(seg.to_string())
            }
        })
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// JSON-pointer escaping for path templates used as pointer tokens.
fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
