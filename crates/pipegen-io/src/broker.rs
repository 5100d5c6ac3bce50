//! C5 — Broker Admin: topic lifecycle and the CLI-shelled introspection the
//! `rdkafka` binding doesn't expose (log-dir sizes, consumer group lag).

use pipegen_core::config::KafkaConfig;
use pipegen_core::error::PipegenError;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Thin wrapper around `rdkafka`'s `AdminClient`, configured the same way
/// the producer and consumer are (`bootstrap.servers` plus a client id).
pub struct BrokerAdmin {
    client: AdminClient<DefaultClientContext>,
    bootstrap_servers: String,
}

impl BrokerAdmin {
    pub fn new(bootstrap_servers: &str) -> Result<Self, PipegenError> {
        let client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("client.id", "pipegen-admin")
            .create()
            .map_err(|e| PipegenError::BrokerError {
                action: "connect",
                topic: String::new(),
                source: e.into(),
            })?;

        Ok(Self {
            client,
            bootstrap_servers: bootstrap_servers.to_string(),
        })
    }

    /// Creates `name` with the given partitions/replication and the default
    /// topic config (retention from `kafka`, `cleanup.policy=delete`,
    /// `compression.type=snappy`). An already-exists result is success.
    pub async fn create_topic(&self, name: &str, kafka: &KafkaConfig) -> Result<(), PipegenError> {
        let mut config = HashMap::new();
        config.insert("retention.ms".to_string(), kafka.retention_ms.to_string());
        config.insert("cleanup.policy".to_string(), "delete".to_string());
        config.insert("compression.type".to_string(), "snappy".to_string());

        let new_topic = NewTopic::new(
            name,
            kafka.partitions,
            TopicReplication::Fixed(kafka.replication_factor),
        )
        .set_config(
            config
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
        );

        let results = self
            .client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| PipegenError::BrokerError {
                action: "create_topic",
                topic: name.to_string(),
                source: e.into(),
            })?;

        for result in results {
            match result {
                Ok(_) => info!(topic = name, "topic created"),
                Err((topic, err)) if err == RDKafkaErrorCode::TopicAlreadyExists => {
                    debug!(topic, "topic already exists, treating as success");
                }
                Err((topic, err)) => {
                    return Err(PipegenError::BrokerError {
                        action: "create_topic",
                        topic,
                        source: anyhow::anyhow!(err.to_string()),
                    })
                }
            }
        }

        Ok(())
    }

    pub async fn create_topics(
        &self,
        names: &[String],
        kafka: &KafkaConfig,
    ) -> Result<(), PipegenError> {
        for name in names {
            self.create_topic(name, kafka).await?;
        }
        Ok(())
    }

    /// Deletes `name`. Idempotent: an absent/disabled-deletion result is
    /// success.
    pub async fn delete_topic(&self, name: &str) -> Result<(), PipegenError> {
        let results = self
            .client
            .delete_topics(&[name], &AdminOptions::new())
            .await
            .map_err(|e| PipegenError::BrokerError {
                action: "delete_topic",
                topic: name.to_string(),
                source: e.into(),
            })?;

        for result in results {
            match result {
                Ok(_) => info!(topic = name, "topic deleted"),
                Err((topic, err))
                    if matches!(
                        err,
                        RDKafkaErrorCode::UnknownTopicOrPartition
                            | RDKafkaErrorCode::TopicDeletionDisabled
                    ) =>
                {
                    debug!(topic, "topic already absent, treating as success");
                }
                Err((topic, err)) => {
                    warn!(topic, error = %err, "topic deletion failed, logging only");
                }
            }
        }

        Ok(())
    }

    pub async fn delete_topics(&self, names: &[String]) {
        for name in names {
            if let Err(err) = self.delete_topic(name).await {
                warn!(topic = name, %err, "cleanup delete_topic failed");
            }
        }
    }

    /// Shells out to the broker's bundled `kafka-log-dirs.sh`-equivalent to
    /// read per-topic log directory sizes, used by the progress monitor's
    /// output-topic-growth signal. Returns the total size in bytes across
    /// all partitions of `topic`, or `0` if the tool reports nothing
    /// parseable (treated as "no growth observed" rather than an error).
    pub async fn describe_topic_log_dirs(&self, topic: &str) -> Result<u64, PipegenError> {
        let output = Command::new("kafka-log-dirs.sh")
            .args([
                "--bootstrap-server",
                &self.bootstrap_servers,
                "--describe",
                "--topic-list",
                topic,
            ])
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(err) => {
                debug!(%err, "kafka-log-dirs.sh unavailable, assuming no growth signal");
                return Ok(0);
            }
        };

        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "kafka-log-dirs.sh returned non-zero, assuming no growth signal"
            );
            return Ok(0);
        }

        Ok(parse_log_dir_size(&String::from_utf8_lossy(&output.stdout), topic))
    }

    /// Shells out to the broker's bundled `kafka-consumer-groups.sh`-
    /// equivalent to read a consumer group's total lag across partitions.
    /// Returns `None` if the group doesn't exist or the tool couldn't be
    /// run — the caller treats that as "no signal", not a failure.
    pub async fn describe_consumer_group(&self, group: &str) -> Result<Option<i64>, PipegenError> {
        let output = Command::new("kafka-consumer-groups.sh")
            .args([
                "--bootstrap-server",
                &self.bootstrap_servers,
                "--describe",
                "--group",
                group,
            ])
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(err) => {
                debug!(%err, group, "kafka-consumer-groups.sh unavailable");
                return Ok(None);
            }
        };

        if !output.status.success() {
            return Ok(None);
        }

        Ok(parse_consumer_group_lag(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

/// Parses `kafka-log-dirs.sh --describe` output looking for the named
/// topic's partition `size` figures and sums them. The tool emits a JSON
/// blob per broker; this function is tolerant of surrounding log noise by
/// scanning for `"topic":"<topic>"` followed by a `"size":<n>` within the
/// same partition object, rather than requiring a full JSON parse of
/// possibly-truncated CLI output.
fn parse_log_dir_size(output: &str, topic: &str) -> u64 {
    let needle = format!("\"topic\":\"{topic}\"");
    let mut total = 0u64;
    let mut search_from = 0usize;
    while let Some(pos) = output[search_from..].find(&needle) {
        let absolute = search_from + pos;
        if let Some(size_pos) = output[absolute..].find("\"size\":") {
            let after = &output[absolute + size_pos + 7..];
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(size) = digits.parse::<u64>() {
                total += size;
            }
        }
        search_from = absolute + needle.len();
    }
    total
}

/// Parses `kafka-consumer-groups.sh --describe` tabular output, summing the
/// `LAG` column across every row. A non-numeric `LAG` (e.g. `-` for an
/// uninitialized offset) contributes zero rather than failing the parse.
fn parse_consumer_group_lag(output: &str) -> Option<i64> {
    let header_line = output
        .lines()
        .find(|line| line.split_whitespace().any(|col| col == "LAG"))?;
    let lag_idx = header_line
        .split_whitespace()
        .position(|col| col == "LAG")?;

    let mut total = 0i64;
    let mut saw_row = false;
    for line in output.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() <= lag_idx || line == header_line {
            continue;
        }
        if let Ok(lag) = cols[lag_idx].parse::<i64>() {
            total += lag;
            saw_row = true;
        }
    }

    saw_row.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_dir_size_for_named_topic() {
        let output = r#"{"version":1,"brokers":[{"partitions":[{"partition":"output-results-0","topic":"output-results","size":4096},{"partition":"output-results-1","topic":"output-results","size":2048}]}]}"#;
        assert_eq!(parse_log_dir_size(output, "output-results"), 6144);
    }

    #[test]
    fn ignores_other_topics_when_parsing_log_dir_size() {
        let output = r#"{"topic":"other","size":9999}{"topic":"mine","size":10}"#;
        assert_eq!(parse_log_dir_size(output, "mine"), 10);
    }

    #[test]
    fn sums_lag_column_across_partitions() {
        let output = "\
GROUP           TOPIC   PARTITION  CURRENT-OFFSET  LOG-END-OFFSET  LAG
flink_table_out mytopic 0          10              15              5
flink_table_out mytopic 1          20              20              0
";
        assert_eq!(parse_consumer_group_lag(output), Some(5));
    }

    #[test]
    fn no_rows_yields_no_signal() {
        let output = "GROUP  TOPIC  PARTITION  CURRENT-OFFSET  LOG-END-OFFSET  LAG\n";
        assert_eq!(parse_consumer_group_lag(output), None);
    }
}
