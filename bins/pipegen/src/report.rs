//! Report generation hook (spec's step 15, external collaborator). The
//! reference behavior only requires that *something* observes the final
//! `PipelineStatus` when `--generate-report` is set; this defines the seam
//! so a real report renderer can be plugged in without touching the Runner.

use pipegen_core::status::PipelineStatus;
use std::path::Path;
use std::time::Duration;

pub trait ReportSink {
    fn write_report(&self, status: &PipelineStatus, elapsed: Duration) -> anyhow::Result<()>;
}

/// Logs a one-line run summary. Used whenever `--generate-report` is set
/// but no richer sink (HTML/dashboard) is configured.
pub struct LoggingReportSink;

impl ReportSink for LoggingReportSink {
    fn write_report(&self, status: &PipelineStatus, elapsed: Duration) -> anyhow::Result<()> {
        let producer = status.producer_snapshot();
        let consumer = status.consumer_snapshot();
        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            messages_produced = producer.sent,
            messages_consumed = consumer.processed,
            consumer_errors = consumer.errors,
            "run summary"
        );
        Ok(())
    }
}

/// Resolves the report sink for a run: `reports_dir` presence doesn't
/// change the sink choice in this implementation (no HTML renderer is in
/// scope), but it's threaded through so a future renderer can write files
/// there; an unwritable directory degrades to the logging sink with a
/// warning rather than failing the run, since report generation is
/// explicitly a non-fatal collaborator.
pub fn resolve_sink(reports_dir: Option<&Path>) -> Box<dyn ReportSink> {
    if let Some(dir) = reports_dir {
        if let Err(err) = std::fs::create_dir_all(dir) {
            tracing::warn!(%err, dir = %dir.display(), "reports dir not writable, falling back to log-only report");
        }
    }
    Box::new(LoggingReportSink)
}
