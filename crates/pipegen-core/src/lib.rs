//! # PipeGen Core - Shared Types and Abstractions
//!
//! This crate provides the foundational types, error taxonomy, and
//! configuration structures shared across the PipeGen pipeline execution
//! engine. It defines the run configuration, the project data model (SQL
//! statements, AVRO schemas, planned resources, traffic patterns), the
//! gateway session/operation vocabulary, and the process-wide (but
//! per-run, not global) pipeline status that producer/consumer/monitor
//! tasks report into.
//!
//! ## Key Components
//!
//! - **Configuration**: [`config::RunConfig`] and the optional
//!   `pipegen.yaml` project file overlay
//! - **Data model**: [`model`] — statements, schemas, resources, traffic
//!   patterns, gateway sessions/operations
//! - **Status**: [`status::PipelineStatus`] and the [`status::StatusObserver`]
//!   trait producer/consumer/monitor tasks report through
//! - **Errors**: [`error::PipegenError`], the structured error taxonomy
//!   every component returns

pub mod config;
pub mod error;
pub mod model;
pub mod status;

pub use config::RunConfig;
pub use error::PipegenError;
pub use model::{
    GatewayOperation, GatewaySession, OperationStatus, Resources, Schema, SchemaType,
    SQLStatement, StatementKind, TrafficPattern, TrafficPatterns,
};
pub use status::{PipelineStatus, StatusObserver};
