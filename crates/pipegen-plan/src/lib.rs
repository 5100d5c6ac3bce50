//! # PipeGen Plan - Project Loading and Resource Planning
//!
//! This crate holds the pure, synchronous preprocessing stages that turn a
//! project directory into a concrete plan for a run: loading and ordering
//! SQL statements, loading and validating AVRO schemas, deriving the topic
//! names and roles a run will use, and parsing the traffic-pattern DSL into
//! a function of elapsed time. None of these modules perform network or
//! broker I/O — that lives in `pipegen-io`.

pub mod resources;
pub mod schema_loader;
pub mod sql_loader;
pub mod traffic;

pub use resources::plan_resources;
pub use schema_loader::load_schemas;
pub use sql_loader::{extract_topics, load_sql};
pub use traffic::parse_traffic_pattern;
