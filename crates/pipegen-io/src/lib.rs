//! # PipeGen IO - Broker, Registry, Gateway, and Data-Plane I/O
//!
//! Everything in this crate talks to the outside world: the Kafka-compatible
//! broker (admin and data plane), the Confluent-compatible schema registry,
//! the Flink-compatible SQL gateway, and the Flink REST API used by the
//! progress monitor. `pipegen-plan` hands this crate pure, already-validated
//! data (`Resources`, `Schema`, `SQLStatement`); this crate never re-derives
//! it.

pub mod broker;
pub mod consumer;
pub mod gateway;
pub mod monitor;
pub mod producer;
pub mod registry;

pub use broker::BrokerAdmin;
pub use consumer::{run_consumer, ConsumerOutcome};
pub use gateway::GatewayClient;
pub use monitor::{wait_for_processing, MonitorOutcome};
pub use producer::{run_producer, ProducerOutcome};
pub use registry::RegistryClient;
