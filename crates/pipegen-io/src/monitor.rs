//! C10 — Progress Monitor: decides when the Flink job has done work, using
//! three independent signals, so the consumer knows it's safe to start.

use crate::broker::BrokerAdmin;
use pipegen_core::status::StatusObserver;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 15;
const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, PartialEq, Eq)]
pub enum MonitorOutcome {
    ProcessingDetected,
    NoSignal,
    JobFailed(String),
}

#[derive(Debug, Deserialize)]
struct FlinkJobsListResponse {
    jobs: Vec<FlinkJobSummary>,
}

#[derive(Debug, Deserialize)]
struct FlinkJobSummary {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct FlinkJobDetailResponse {
    vertices: Vec<FlinkVertex>,
}

#[derive(Debug, Deserialize)]
struct FlinkVertex {
    metrics: FlinkVertexMetrics,
}

#[derive(Debug, Deserialize)]
struct FlinkVertexMetrics {
    #[serde(rename = "read-records", default)]
    read_records: u64,
    #[serde(rename = "write-records", default)]
    write_records: u64,
}

/// Polls up to `MAX_ATTEMPTS` times, `POLL_INTERVAL` apart, for any of
/// three signals that the deployed job has started doing work. A `FAILED`
/// job status at any point aborts immediately with a fatal outcome.
/// Exhausting attempts without a signal returns `NoSignal` — not a
/// failure: the consumer starts anyway.
pub async fn wait_for_processing(
    flink_url: &str,
    broker: &BrokerAdmin,
    consumer_group: &str,
    output_topic: &str,
    status: Arc<dyn StatusObserver>,
    cancel: &CancellationToken,
) -> MonitorOutcome {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("reqwest client builds with static config");

    for attempt in 1..=MAX_ATTEMPTS {
        if cancel.is_cancelled() {
            return MonitorOutcome::NoSignal;
        }

        match check_flink_signal(&http, flink_url, &status).await {
            Ok(FlinkSignal::Detected) => return MonitorOutcome::ProcessingDetected,
            Ok(FlinkSignal::Failed(message)) => return MonitorOutcome::JobFailed(message),
            Ok(FlinkSignal::NoJobs) | Err(_) => {}
        }

        if let Ok(Some(lag)) = broker.describe_consumer_group(consumer_group).await {
            if lag == 0 {
                debug!(consumer_group, "consumer group lag is zero, all input consumed");
                return MonitorOutcome::ProcessingDetected;
            }
        }

        if let Ok(size) = broker.describe_topic_log_dirs(output_topic).await {
            if size > 0 {
                debug!(output_topic, size, "output topic has grown");
                return MonitorOutcome::ProcessingDetected;
            }
        }

        debug!(attempt, MAX_ATTEMPTS, "no processing signal yet");
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = cancel.cancelled() => return MonitorOutcome::NoSignal,
        }
    }

    warn!("progress monitor exhausted attempts with no signal, proceeding anyway");
    MonitorOutcome::NoSignal
}

enum FlinkSignal {
    Detected,
    Failed(String),
    NoJobs,
}

async fn check_flink_signal(
    http: &reqwest::Client,
    flink_url: &str,
    status: &Arc<dyn StatusObserver>,
) -> Result<FlinkSignal, anyhow::Error> {
    let jobs_url = format!("{flink_url}/jobs");
    let response = http.get(&jobs_url).send().await?;
    if !response.status().is_success() {
        return Ok(FlinkSignal::NoJobs);
    }
    let jobs: FlinkJobsListResponse = response.json().await?;

    for job in &jobs.jobs {
        if job.status == "FAILED" {
            return Ok(FlinkSignal::Failed(format!("flink job {} failed", job.id)));
        }
    }

    let running: Vec<&FlinkJobSummary> = jobs.jobs.iter().filter(|j| j.status == "RUNNING").collect();
    if running.is_empty() {
        return Ok(FlinkSignal::NoJobs);
    }

    let mut total_read = 0u64;
    let mut total_write = 0u64;
    let mut jobs_running = 0u32;

    for job in running {
        let detail_url = format!("{flink_url}/jobs/{}", job.id);
        let detail_response = match http.get(&detail_url).send().await {
            Ok(r) if r.status().is_success() => r,
            _ => continue,
        };
        let detail: FlinkJobDetailResponse = match detail_response.json().await {
            Ok(d) => d,
            Err(_) => continue,
        };
        jobs_running += 1;
        for vertex in detail.vertices {
            total_read += vertex.metrics.read_records;
            total_write += vertex.metrics.write_records;
        }
    }

    status.report_flink(
        jobs_running,
        total_read,
        total_write,
        total_read + total_write > 0,
    );

    if total_read + total_write > 0 && total_write > 0 {
        info!(total_read, total_write, "flink metrics show processing activity");
        Ok(FlinkSignal::Detected)
    } else {
        Ok(FlinkSignal::NoJobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_records_both_required_for_strong_signal() {
        // Reads alone are insufficient: Flink may read without producing
        // sink output, so the positive branch requires write_records > 0
        // too (spec's explicit non-goal of treating reads as sufficient).
        let total_read = 100u64;
        let total_write = 0u64;
        assert!(!(total_read + total_write > 0 && total_write > 0));
    }
}
