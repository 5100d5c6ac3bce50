//! Core data model shared by every component: loaded SQL statements, parsed
//! AVRO schemas, planned broker resources, traffic patterns, and the
//! gateway's session/operation vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of a loaded SQL statement, inferred shallowly from its
/// (comment-stripped) content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    CreateTable,
    CreateView,
    Insert,
    Select,
    Other,
}

/// A single SQL statement loaded from a project's `sql/` directory.
///
/// `order` is the statement's position in filename-lexicographic order,
/// starting at 1; execution always honors this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SQLStatement {
    pub name: String,
    pub content: String,
    pub order: usize,
    pub kind: StatementKind,
}

/// The shape of a loaded AVRO schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaType {
    Record,
    Array,
    Map,
}

/// An AVRO schema loaded from a project's `schemas/` directory.
///
/// `rawText` is retained verbatim (not re-serialized) so it can be submitted
/// to the registry byte-for-byte and reused to build the AVRO codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub namespace: Option<String>,
    pub schema_type: SchemaType,
    pub fields: Vec<String>,
    pub raw_text: String,
    pub source_path: String,
}

/// Planned broker resources for a run: the input/output topic roles and the
/// full set of topics the run owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    pub prefix: String,
    pub input_topic: String,
    pub output_topic: String,
    pub topics: Vec<String>,
}

/// One entry of a parsed traffic pattern: during `[start, end)` elapsed
/// time, the base emission rate is multiplied by `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficPattern {
    pub start: std::time::Duration,
    pub end: std::time::Duration,
    pub multiplier: f64,
}

/// A parsed, validated, sorted, non-overlapping set of traffic pattern
/// entries plus the base rate they multiply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficPatterns {
    pub base_rate: f64,
    pub entries: Vec<TrafficPattern>,
}

impl TrafficPatterns {
    /// A pattern set with no entries: `rateAt` always returns `base_rate`.
    pub fn constant(base_rate: f64) -> Self {
        Self {
            base_rate,
            entries: Vec::new(),
        }
    }

    /// `rateAt(elapsed) = base_rate * multiplier` for the first covering
    /// half-open interval `[start, end)`; otherwise `base_rate`. Entries are
    /// assumed sorted and non-overlapping (enforced at parse time), so a
    /// linear scan that returns on first match is correct and matches
    /// spec's "step changes, not interpolated" semantics.
    pub fn rate_at(&self, elapsed: std::time::Duration) -> f64 {
        for entry in &self.entries {
            if elapsed >= entry.start && elapsed < entry.end {
                return self.base_rate * entry.multiplier;
            }
        }
        self.base_rate
    }
}

/// An opaque handle identifying a gateway session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

/// The lifecycle status of a gateway operation (one statement's execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Finished,
    Error,
}

/// An asynchronous statement execution within a gateway session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOperation {
    pub handle: String,
    pub statement_name: String,
    pub status: OperationStatus,
    pub error_text: Option<String>,
    pub result_payload: Option<String>,
}

/// Optional per-project overrides read from `pipegen.yaml` at the project
/// root. Every field is optional: absent fields fall back to CLI flags and
/// then to [`crate::config::RunConfig`]'s built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipegenProjectFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message_rate: Option<f64>,
    #[serde(default)]
    pub traffic_pattern: Option<String>,
    #[serde(default)]
    pub partitions: Option<i32>,
    #[serde(default)]
    pub replication_factor: Option<i32>,
    #[serde(default)]
    pub retention_ms: Option<i64>,
    /// Free-form extra key/value pairs preserved for forward-compatibility
    /// with fields this engine doesn't interpret.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}
