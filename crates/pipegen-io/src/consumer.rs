//! C9 — AVRO Consumer: reads the output topic with a fresh consumer group
//! and validates records until one of three stop conditions fires.

use apache_avro::from_avro_datum;
use apache_avro::schema::Schema as AvroSchema;
use pipegen_core::status::StatusObserver;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NO_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
const MAX_FALLBACK_RECORD_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct ConsumerOutcome {
    pub consumed: u64,
    pub decode_errors: u64,
}

/// Reads from `topic` under a fresh `pipegen-consumer-<unix-ns>` group,
/// stopping when `expected` is reached (if nonzero), after
/// `NO_MESSAGE_TIMEOUT` with zero messages consumed, or on cancellation.
pub async fn run_consumer(
    bootstrap_servers: &str,
    topic: &str,
    schema: Option<&AvroSchema>,
    expected: u64,
    status: Arc<dyn StatusObserver>,
    cancel: CancellationToken,
) -> ConsumerOutcome {
    let group_id = format!(
        "pipegen-consumer-{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    );

    let consumer: StreamConsumer = match ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("group.id", &group_id)
        .set("session.timeout.ms", "10000")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
    {
        Ok(c) => c,
        Err(err) => {
            warn!(%err, "failed to create consumer, aborting consumer loop");
            return ConsumerOutcome::default();
        }
    };

    if let Err(err) = consumer.subscribe(&[topic]) {
        warn!(%err, topic, "failed to subscribe, aborting consumer loop");
        return ConsumerOutcome::default();
    }

    let start = Instant::now();
    let mut consumed: u64 = 0;
    let mut decode_errors: u64 = 0;
    let mut last_message_at = Instant::now();
    let mut last_progress = Instant::now();

    loop {
        if expected > 0 && consumed >= expected {
            break;
        }
        if consumed == 0 && last_message_at.elapsed() >= NO_MESSAGE_TIMEOUT {
            info!("empty-output timeout reached, stopping consumer");
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            recv = tokio::time::timeout(Duration::from_secs(1), consumer.recv()) => {
                match recv {
                    Ok(Ok(message)) => {
                        last_message_at = Instant::now();
                        if let Some(payload) = message.payload() {
                            if validate_record(payload, schema, message.partition(), message.offset()) {
                                consumed += 1;
                            } else {
                                decode_errors += 1;
                                warn!("consumer decode/validation error for record, counted and continuing");
                            }
                        } else {
                            decode_errors += 1;
                        }

                        if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                            warn!(%err, "commit failed, best-effort only");
                        }
                    }
                    Ok(Err(err)) => {
                        warn!(%err, "consumer recv error, continuing");
                    }
                    Err(_) => {
                        // 1 s fetch deadline elapsed with no message; loop re-checks stop conditions.
                    }
                }
            }
        }

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            let elapsed = start.elapsed();
            status.report_consumer(
                consumed,
                consumed as f64 / elapsed.as_secs_f64().max(1.0),
                decode_errors,
                elapsed,
                true,
            );
            if expected > 0 {
                let pct = (consumed as f64 / expected as f64) * 100.0;
                debug!(pct, consumed, expected, "consumer progress");
            }
            last_progress = Instant::now();
        }
    }

    status.report_consumer(consumed, 0.0, decode_errors, start.elapsed(), false);
    ConsumerOutcome { consumed, decode_errors }
}

/// Validates one record's bytes. With a codec, requires the Confluent
/// framing (≥5 bytes, magic `0x00`) and a successful AVRO decode. Without a
/// codec, applies fallback validation: non-empty, within the size cap, and
/// a non-negative partition/offset.
fn validate_record(payload: &[u8], schema: Option<&AvroSchema>, partition: i32, offset: i64) -> bool {
    match schema {
        Some(schema) => decode_framed(payload, schema).is_some(),
        None => {
            partition >= 0
                && offset >= 0
                && !payload.is_empty()
                && payload.len() <= MAX_FALLBACK_RECORD_SIZE
        }
    }
}

/// Decodes a Confluent-framed payload: magic byte `0x00`, big-endian schema
/// ID in bytes `[1..5)`, AVRO-binary payload in the remainder. Returns
/// `None` (rather than propagating) on any structural or decode failure —
/// the caller counts this as a per-record decode error, consistent with
/// the non-fatal per-record error policy.
fn decode_framed(payload: &[u8], schema: &AvroSchema) -> Option<apache_avro::types::Value> {
    if payload.len() < 5 || payload[0] != 0x00 {
        return None;
    }
    let mut body = &payload[5..];
    from_avro_datum(schema, &mut body, None).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::to_avro_datum;
    use apache_avro::types::Value;
    use apache_avro::Schema as AvroSchemaParser;

    fn schema() -> AvroSchema {
        AvroSchemaParser::parse_str(
            r#"{"type":"record","name":"Event","fields":[{"name":"id","type":"string"}]}"#,
        )
        .unwrap()
    }

    fn framed(schema: &AvroSchema, schema_id: i32) -> Vec<u8> {
        let value = Value::Record(vec![("id".to_string(), Value::String("abc".to_string()))]);
        let datum = to_avro_datum(schema, value).unwrap();
        let mut out = vec![0x00];
        out.extend_from_slice(&schema_id.to_be_bytes());
        out.extend_from_slice(&datum);
        out
    }

    #[test]
    fn decodes_well_formed_confluent_frame() {
        let schema = schema();
        let bytes = framed(&schema, 7);
        assert!(validate_record(&bytes, Some(&schema), 0, 0));
    }

    #[test]
    fn rejects_missing_magic_byte() {
        let schema = schema();
        let mut bytes = framed(&schema, 7);
        bytes[0] = 0x01;
        assert!(!validate_record(&bytes, Some(&schema), 0, 0));
    }

    #[test]
    fn rejects_too_short_payload() {
        let schema = schema();
        assert!(!validate_record(&[0x00, 0x00], Some(&schema), 0, 0));
    }

    #[test]
    fn fallback_validation_accepts_nonempty_small_payload() {
        assert!(validate_record(b"hello", None, 0, 0));
        assert!(!validate_record(b"", None, 0, 0));
    }

    #[test]
    fn fallback_validation_rejects_oversized_payload() {
        let big = vec![0u8; MAX_FALLBACK_RECORD_SIZE + 1];
        assert!(!validate_record(&big, None, 0, 0));
    }

    #[test]
    fn fallback_validation_rejects_negative_partition_or_offset() {
        assert!(!validate_record(b"hello", None, -1, 0));
        assert!(!validate_record(b"hello", None, 0, -1));
    }
}
