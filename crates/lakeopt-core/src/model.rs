//! Wire-level request and result shapes.
//!
//! These types are passed through the core untouched: the runner never edits
//! statements or `queryid` values, it only validates them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A single SQL statement (DDL or migration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlStatement {
    pub statement: String,
}

impl DdlStatement {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }
}

/// One workload query with its caller-supplied id and run frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    pub queryid: String,
    pub query: String,
    pub runquantity: u64,
}

/// Input accepted by `POST /new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    /// Warehouse connection descriptor. Opaque to the core.
    pub url: String,
    pub ddl: Vec<DdlStatement>,
    pub queries: Vec<QueryItem>,
}

impl OptimizationRequest {
    /// Distinct `queryid` values of the workload.
    pub fn query_ids(&self) -> HashSet<&str> {
        self.queries.iter().map(|q| q.queryid.as_str()).collect()
    }

    /// First `queryid` that appears more than once, if any.
    pub fn duplicate_query_id(&self) -> Option<&str> {
        let mut seen = HashSet::with_capacity(self.queries.len());
        self.queries
            .iter()
            .map(|q| q.queryid.as_str())
            .find(|id| !seen.insert(*id))
    }
}

/// A rewritten workload query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenQuery {
    pub queryid: String,
    pub query: String,
}

/// Optimization proposal produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub ddl: Vec<DdlStatement>,
    pub migrations: Vec<DdlStatement>,
    pub queries: Vec<RewrittenQuery>,
}
