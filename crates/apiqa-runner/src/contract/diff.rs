//! Operation-level diff between two OpenAPI documents.
//!
//! A coarse breaking-change detector: which (method, path) operations were
//! added or removed, and which kept operations changed their declared
//! response-status sets. No schema comparison.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::list_operations;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpSig {
    pub method: String,
    pub path: String,
}

/// A kept operation whose declared response statuses differ between A and B.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub method: String,
    pub path: String,
    pub a: Vec<String>,
    pub b: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffReport {
    /// Present in B, not in A.
    pub added: Vec<OpSig>,
    /// Present in A, not in B.
    pub removed: Vec<OpSig>,
    /// Same operation, different declared status sets.
    pub changed_status: Vec<StatusChange>,
}

/// Compare two documents. All output vectors are sorted by (path, method)
/// so reports are stable across runs.
#[must_use]
pub fn diff_documents(a: &Value, b: &Value) -> DiffReport {
    let ops_a = list_operations(a);
    let ops_b = list_operations(b);

    let set_a: HashSet<&(String, String)> = ops_a.iter().collect();
    let set_b: HashSet<&(String, String)> = ops_b.iter().collect();

    let mut added: Vec<OpSig> = ops_b
        .iter()
        .filter(|op| !set_a.contains(op))
        .map(|(m, p)| OpSig {
            method: m.clone(),
            path: p.clone(),
        })
        .collect();
    let mut removed: Vec<OpSig> = ops_a
        .iter()
        .filter(|op| !set_b.contains(op))
        .map(|(m, p)| OpSig {
            method: m.clone(),
            path: p.clone(),
        })
        .collect();

    let mut changed_status: Vec<StatusChange> = ops_a
        .iter()
        .filter(|op| set_b.contains(op))
        .filter_map(|(method, path)| {
            let sa = status_set(a, method, path);
            let sb = status_set(b, method, path);
            (sa != sb).then(|| StatusChange {
                method: method.clone(),
                path: path.clone(),
                a: sa.into_iter().collect(),
                b: sb.into_iter().collect(),
            })
        })
        .collect();

    added.sort_by(|x, y| x.path.cmp(&y.path).then_with(|| x.method.cmp(&y.method)));
    removed.sort_by(|x, y| x.path.cmp(&y.path).then_with(|| x.method.cmp(&y.method)));
    changed_status.sort_by(|x, y| x.path.cmp(&y.path).then_with(|| x.method.cmp(&y.method)));

    DiffReport {
        added,
        removed,
        changed_status,
    }
}

fn status_set(doc: &Value, method: &str, path: &str) -> BTreeSet<String> {
    doc.get("paths")
        .and_then(|p| p.get(path))
        .and_then(|item| item.get(method.to_lowercase()))
        .and_then(|op| op.get("responses"))
        .and_then(Value::as_object)
        .map(|responses| responses.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Validator;

    const SPEC_A: &str = r#"
openapi: 3.0.3
info: {title: A, version: "1"}
paths:
  /users:
    get:  { responses: {"200": {description: ok}} }
    post: { responses: {"201": {description: created}} }
  /health:
    get:  { responses: {"200": {description: ok}} }
"#;

    const SPEC_B: &str = r#"
openapi: 3.0.3
info: {title: B, version: "1"}
paths:
  /users:
    get:  { responses: {"200": {description: ok}} }
    post: { responses: {"200": {description: ok}} }
  /status:
    get:  { responses: {"200": {description: ok}} }
"#;

    fn docs() -> (Value, Value) {
        let a = Validator::load_from_bytes(SPEC_A.as_bytes()).unwrap();
        let b = Validator::load_from_bytes(SPEC_B.as_bytes()).unwrap();
        (a.document().clone(), b.document().clone())
    }

    #[test]
    fn add_remove_and_status_change() {
        let (a, b) = docs();
        let rep = diff_documents(&a, &b);

        assert_eq!(
            rep.added,
            vec![OpSig {
                method: "GET".into(),
                path: "/status".into()
            }]
        );
        assert_eq!(
            rep.removed,
            vec![OpSig {
                method: "GET".into(),
                path: "/health".into()
            }]
        );

        assert_eq!(rep.changed_status.len(), 1);
        let ch = &rep.changed_status[0];
        assert_eq!((ch.method.as_str(), ch.path.as_str()), ("POST", "/users"));
        assert_eq!(ch.a, vec!["201"]);
        assert_eq!(ch.b, vec!["200"]);
    }

    #[test]
    fn diff_is_symmetric() {
        let (a, b) = docs();
        let forward = diff_documents(&a, &b);
        let backward = diff_documents(&b, &a);

        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);

        let ops =
            |chs: &[StatusChange]| -> Vec<(String, String)> {
                chs.iter()
                    .map(|c| (c.method.clone(), c.path.clone()))
                    .collect()
            };
        assert_eq!(ops(&forward.changed_status), ops(&backward.changed_status));
        for (f, r) in forward.changed_status.iter().zip(&backward.changed_status) {
            assert_eq!(f.a, r.b);
            assert_eq!(f.b, r.a);
        }
    }

    #[test]
    fn identical_documents_diff_empty() {
        let (a, _) = docs();
        let rep = diff_documents(&a, &a);
        assert!(rep.added.is_empty());
        assert!(rep.removed.is_empty());
        assert!(rep.changed_status.is_empty());
    }

    #[test]
    fn output_sorted_by_path_then_method() {
        let a = Validator::load_from_bytes(
            b"openapi: 3.0.0\ninfo: {title: A, version: '1'}\npaths: {}\n",
        )
        .unwrap();
        let b = Validator::load_from_bytes(
            br#"
openapi: 3.0.0
info: {title: B, version: "1"}
paths:
  /b:
    get: { responses: {"200": {description: ok}} }
  /a:
    post: { responses: {"200": {description: ok}} }
    get: { responses: {"200": {description: ok}} }
"#,
        )
        .unwrap();
        let rep = diff_documents(a.document(), b.document());
        let sigs: Vec<String> = rep
            .added
            .iter()
            .map(|o| format!("{} {}", o.method, o.path))
            .collect();
        assert_eq!(sigs, vec!["GET /a", "POST /a", "GET /b"]);
    }
}
