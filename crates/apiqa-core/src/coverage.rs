//! Operation coverage: which (method, templated path) pairs a run exercised.

use std::collections::{BTreeSet, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CoverageReport {
    pub total: usize,
    pub covered: usize,
    pub percent: f64,
    pub covered_set: Vec<String>,
    pub uncovered_set: Vec<String>,
}

impl CoverageReport {
    /// Compute coverage from the spec's full operation list and the set of
    /// operations observed by contract expectations (method → templated
    /// paths). An empty spec counts as fully covered.
    #[must_use]
    pub fn compute(
        all_ops: &[(String, String)],
        covered: &HashMap<String, BTreeSet<String>>,
    ) -> Self {
        let observed: BTreeSet<String> = covered
            .iter()
            .flat_map(|(method, paths)| {
                let method = method.to_uppercase();
                paths
                    .iter()
                    .map(move |p| format!("{method} {p}"))
            })
            .collect();

        let mut covered_set = Vec::new();
        let mut uncovered_set = Vec::new();
        for (method, path) in all_ops {
            let sig = format!("{method} {path}");
            if observed.contains(&sig) {
                covered_set.push(sig);
            } else {
                uncovered_set.push(sig);
            }
        }
        covered_set.sort();
        uncovered_set.sort();

        let total = all_ops.len();
        let count = covered_set.len();
        let percent = if total == 0 {
            100.0
        } else {
            count as f64 * 100.0 / total as f64
        };

        Self {
            total,
            covered: count,
            percent,
            covered_set,
            uncovered_set,
        }
    }

    /// Gate check with a small epsilon so a 66.666…% observation passes a
    /// 66.67 threshold computed the same way.
    #[must_use]
    pub fn passes_gate(&self, min_percent: f64) -> bool {
        self.percent + 1e-9 >= min_percent
    }
}
