//! C8 — AVRO Producer: synthesizes records matching the input schema and
//! publishes them to the input topic at a traffic-pattern-driven rate.

use apache_avro::schema::{RecordField, Schema as AvroSchema};
use apache_avro::types::Value as AvroValue;
use apache_avro::to_avro_datum;
use pipegen_core::model::TrafficPatterns;
use pipegen_core::status::StatusObserver;
use rand::Rng;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
const RATE_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// An optional AVRO codec paired with the registry schema ID that must be
/// framed alongside every encoded record.
pub struct AvroCodec {
    pub schema: AvroSchema,
    pub schema_id: i32,
}

#[derive(Debug, Default)]
pub struct ProducerOutcome {
    pub sent: u64,
}

/// Runs the producer loop until `cancel` fires. `codec` is `None` when no
/// registry subject/codec is available, in which case records fall back to
/// plain JSON bytes of the synthesized value. Takes ownership of its inputs
/// so the whole call can be handed to `tokio::spawn`, which requires a
/// `'static` future.
pub async fn run_producer(
    bootstrap_servers: String,
    topic: String,
    codec: Option<AvroCodec>,
    traffic: TrafficPatterns,
    status: Arc<dyn StatusObserver>,
    cancel: CancellationToken,
) -> ProducerOutcome {
    let producer: FutureProducer = match ClientConfig::new()
        .set("bootstrap.servers", &bootstrap_servers)
        .set("message.timeout.ms", "5000")
        .create()
    {
        Ok(p) => p,
        Err(err) => {
            warn!(%err, "failed to create producer, aborting producer loop");
            return ProducerOutcome::default();
        }
    };

    let start = Instant::now();
    let mut sent: u64 = 0;
    let mut last_progress = Instant::now();
    let mut last_rate_check = Instant::now();
    let mut current_rate = traffic.rate_at(Duration::from_secs(0));
    let mut interval = tokio::time::interval(rate_to_interval(current_rate));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let elapsed = start.elapsed();

                if last_rate_check.elapsed() >= RATE_CHECK_INTERVAL {
                    let new_rate = traffic.rate_at(elapsed);
                    if (new_rate - current_rate).abs() > f64::EPSILON {
                        current_rate = new_rate;
                        interval = tokio::time::interval(rate_to_interval(current_rate));
                    }
                    last_rate_check = Instant::now();
                }

                let value = codec
                    .as_ref()
                    .map(|c| synthesize_value(&c.schema))
                    .unwrap_or(AvroValue::Null);
                let payload = match &codec {
                    Some(c) => match encode_framed(&c.schema, c.schema_id, &value) {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            warn!(%err, "avro encode failed for message, skipping");
                            continue;
                        }
                    },
                    None => serde_json::to_vec(&avro_value_to_json(&value)).unwrap_or_default(),
                };

                let key = format!("key-{sent}");
                let record = FutureRecord::to(&topic).payload(&payload).key(&key);
                match producer.send(record, Duration::from_secs(0)).await {
                    Ok(_) => sent += 1,
                    Err((err, _)) => warn!(%err, "producer send failed, continuing"),
                }

                if last_progress.elapsed() >= PROGRESS_INTERVAL {
                    status.report_producer(sent, sent as f64 / elapsed.as_secs_f64().max(1.0), current_rate, elapsed);
                    last_progress = Instant::now();
                }
            }
        }
    }

    debug!(sent, "producer loop exited");
    ProducerOutcome { sent }
}

fn rate_to_interval(rate: f64) -> Duration {
    if rate <= 0.0 {
        return Duration::from_secs(1);
    }
    Duration::from_secs_f64(1.0 / rate)
}

fn encode_framed(schema: &AvroSchema, schema_id: i32, value: &AvroValue) -> anyhow::Result<Vec<u8>> {
    let datum = to_avro_datum(schema, value.clone())?;
    let mut framed = Vec::with_capacity(5 + datum.len());
    framed.push(0u8);
    framed.extend_from_slice(&schema_id.to_be_bytes());
    framed.extend_from_slice(&datum);
    Ok(framed)
}

/// Well-known field names that get domain-flavored string values instead of
/// generic random strings, for realism in generated sample data.
fn domain_string_for(field_name: &str) -> Option<&'static str> {
    match field_name {
        "id" | "user_id" => Some("f47ac10b-58cc-4372-a567-0e02b2c3d479"),
        "event_type" => Some("page_view"),
        "url" => Some("https://example.com/landing"),
        "status" => Some("active"),
        "category" => Some("electronics"),
        "country" => Some("US"),
        "email" => Some("sample.user@example.com"),
        _ => None,
    }
}

/// Walks the schema tree, producing one sample `Value` per spec's synthesis
/// rules: random-of-type primitives, first non-null union branch, uniform
/// enum symbol, minimal record/array/map shapes.
pub fn synthesize_value(schema: &AvroSchema) -> AvroValue {
    match schema {
        AvroSchema::Null => AvroValue::Null,
        AvroSchema::Boolean => AvroValue::Boolean(rand::thread_rng().gen_bool(0.5)),
        AvroSchema::Int => AvroValue::Int(rand::thread_rng().gen_range(0..10_000)),
        AvroSchema::Long => AvroValue::Long(chrono::Utc::now().timestamp_millis()),
        AvroSchema::Float => AvroValue::Float(rand::thread_rng().gen_range(0.0..1000.0)),
        AvroSchema::Double => AvroValue::Double(rand::thread_rng().gen_range(0.0..1000.0)),
        AvroSchema::Bytes => AvroValue::Bytes(vec![0u8, 1, 2, 3]),
        AvroSchema::String => AvroValue::String("sample-value".to_string()),
        AvroSchema::TimestampMillis => AvroValue::TimestampMillis(chrono::Utc::now().timestamp_millis()),
        AvroSchema::Union(union) => {
            let variants = union.variants();
            match variants.iter().position(|s| !matches!(s, AvroSchema::Null)) {
                Some(idx) => AvroValue::Union(idx as i32, Box::new(synthesize_value(&variants[idx]))),
                None => AvroValue::Union(0, Box::new(AvroValue::Null)),
            }
        }
        AvroSchema::Enum { symbols, .. } => {
            let idx = rand::thread_rng().gen_range(0..symbols.len().max(1));
            AvroValue::Enum(idx as i32, symbols.get(idx).cloned().unwrap_or_default())
        }
        AvroSchema::Array(inner) => AvroValue::Array(vec![synthesize_value(inner)]),
        AvroSchema::Map(inner) => {
            let mut map = std::collections::HashMap::new();
            map.insert("key".to_string(), synthesize_value(inner));
            AvroValue::Map(map)
        }
        AvroSchema::Record { fields, .. } => {
            let values = fields
                .iter()
                .map(|f: &RecordField| {
                    let value = domain_string_for(&f.name)
                        .map(|s| AvroValue::String(s.to_string()))
                        .unwrap_or_else(|| synthesize_value(&f.schema));
                    (f.name.clone(), value)
                })
                .collect();
            AvroValue::Record(values)
        }
        _ => AvroValue::Null,
    }
}

/// Converts a synthesized `Value` to a `serde_json::Value` for the no-codec
/// fallback path (plain JSON bytes of the record value).
fn avro_value_to_json(value: &AvroValue) -> serde_json::Value {
    match value {
        AvroValue::Null => serde_json::Value::Null,
        AvroValue::Boolean(b) => serde_json::Value::Bool(*b),
        AvroValue::Int(i) => serde_json::json!(i),
        AvroValue::Long(l) => serde_json::json!(l),
        AvroValue::Float(f) => serde_json::json!(f),
        AvroValue::Double(d) => serde_json::json!(d),
        AvroValue::String(s) => serde_json::Value::String(s.clone()),
        AvroValue::Bytes(b) => serde_json::json!(b),
        AvroValue::TimestampMillis(t) => serde_json::json!(t),
        AvroValue::Union(_, inner) => avro_value_to_json(inner),
        AvroValue::Enum(_, symbol) => serde_json::Value::String(symbol.clone()),
        AvroValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(avro_value_to_json).collect())
        }
        AvroValue::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), avro_value_to_json(v)))
                .collect(),
        ),
        AvroValue::Record(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), avro_value_to_json(v)))
                .collect(),
        ),
        _ => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::Schema as AvroSchemaParser;

    #[test]
    fn synthesizes_record_with_domain_flavored_well_known_fields() {
        let schema = AvroSchemaParser::parse_str(
            r#"{"type":"record","name":"Event","fields":[
                {"name":"id","type":"string"},
                {"name":"amount","type":"double"}
            ]}"#,
        )
        .unwrap();

        let value = synthesize_value(&schema);
        if let AvroValue::Record(fields) = value {
            let id = fields.iter().find(|(name, _)| name == "id").unwrap();
            assert_eq!(id.1, AvroValue::String("f47ac10b-58cc-4372-a567-0e02b2c3d479".to_string()));
        } else {
            panic!("expected record value");
        }
    }

    #[test]
    fn union_with_null_picks_non_null_branch() {
        let schema = AvroSchemaParser::parse_str(r#"["null","string"]"#).unwrap();
        let value = synthesize_value(&schema);
        match value {
            AvroValue::Union(_, inner) => assert!(matches!(*inner, AvroValue::String(_))),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn framed_payload_has_confluent_magic_byte_and_schema_id() {
        let schema = AvroSchemaParser::parse_str(
            r#"{"type":"record","name":"Event","fields":[{"name":"id","type":"string"}]}"#,
        )
        .unwrap();
        let value = synthesize_value(&schema);
        let framed = encode_framed(&schema, 42, &value).unwrap();

        assert_eq!(framed[0], 0x00);
        let schema_id = i32::from_be_bytes([framed[1], framed[2], framed[3], framed[4]]);
        assert_eq!(schema_id, 42);
    }
}
