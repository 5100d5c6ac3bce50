//! Run configuration: the full set of inputs to a single pipeline run.

use crate::error::PipegenError;
use crate::model::PipegenProjectFile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kafka topic-creation defaults (spec §4.5): partitions, replication
/// factor, and retention applied to every topic this run creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub partitions: i32,
    pub replication_factor: i32,
    pub retention_ms: i64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            replication_factor: 1,
            retention_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

/// How the gateway client acquires a session for this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionMode {
    /// A fresh session owned exclusively by this run.
    PerRun,
    /// Reuse (or create and remember) a session under a well-known name,
    /// shared across runs.
    Shared { name: String },
}

impl Default for SessionMode {
    fn default() -> Self {
        SessionMode::PerRun
    }
}

/// All inputs to a single pipeline run (spec §3).
///
/// Built by merging, in priority order: CLI flags > `pipegen.yaml` project
/// file > these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub project_dir: PathBuf,
    pub message_rate: f64,
    pub duration: Duration,
    pub pipeline_timeout: Duration,
    /// 0 means auto-derive from the producer's final count, or from
    /// `rate * duration` if no producer ran.
    pub expected_messages: u64,
    pub cleanup: bool,
    pub dry_run: bool,

    pub bootstrap_servers: String,
    pub sql_gateway_rest_url: String,
    /// Derived from `sql_gateway_rest_url` by the 8081->8083 port rule
    /// unless explicitly set.
    pub sql_gateway_sql_url: String,
    pub flink_url: String,
    pub schema_registry_url: String,

    pub local_mode: bool,
    pub traffic_pattern: String,
    pub kafka: KafkaConfig,
    pub session_mode: SessionMode,
    /// Filesystem-source mode: the producer is skipped and the monitor
    /// starts immediately.
    pub csv_mode: bool,

    pub generate_report: bool,
    pub reports_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Normalizes a partially-specified config: fills in the derived
    /// gateway SQL URL, applies the project file overlay (if present), and
    /// validates the invariants from spec §3.
    pub fn normalize(mut self) -> Result<Self, PipegenError> {
        if self.sql_gateway_sql_url.is_empty() {
            self.sql_gateway_sql_url = derive_sql_url(&self.sql_gateway_rest_url);
        }

        if let Some(project_file) = load_project_file(&self.project_dir)? {
            self.apply_overlay(&project_file);
        }

        self.validate()?;
        Ok(self)
    }

    fn apply_overlay(&mut self, overlay: &PipegenProjectFile) {
        if let Some(rate) = overlay.message_rate {
            self.message_rate = rate;
        }
        if let Some(pattern) = &overlay.traffic_pattern {
            if self.traffic_pattern.is_empty() {
                self.traffic_pattern = pattern.clone();
            }
        }
        if let Some(partitions) = overlay.partitions {
            self.kafka.partitions = partitions;
        }
        if let Some(replication) = overlay.replication_factor {
            self.kafka.replication_factor = replication;
        }
        if let Some(retention) = overlay.retention_ms {
            self.kafka.retention_ms = retention;
        }
    }

    fn validate(&self) -> Result<(), PipegenError> {
        if self.message_rate <= 0.0 {
            return Err(PipegenError::ProjectInvalid(format!(
                "message rate must be > 0, got {}",
                self.message_rate
            )));
        }
        if self.duration > self.pipeline_timeout {
            return Err(PipegenError::ProjectInvalid(format!(
                "producer duration ({:?}) must not exceed pipeline timeout ({:?})",
                self.duration, self.pipeline_timeout
            )));
        }
        Ok(())
    }
}

/// Derives the Flink SQL gateway's "SQL" endpoint URL from its REST URL by
/// the port-8081-to-8083 rule (spec §3). Any other port, or a URL without a
/// parseable port, is returned unchanged.
pub fn derive_sql_url(rest_url: &str) -> String {
    if let Some(idx) = rest_url.rfind(":8081") {
        let mut derived = rest_url.to_string();
        derived.replace_range(idx..idx + 5, ":8083");
        derived
    } else {
        rest_url.to_string()
    }
}

/// Loads `pipegen.yaml` from the project root, if present. Absence is not
/// an error: the overlay is optional.
fn load_project_file(project_dir: &Path) -> Result<Option<PipegenProjectFile>, PipegenError> {
    let path = project_dir.join("pipegen.yaml");
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| {
        PipegenError::ProjectInvalid(format!("failed to read {}: {e}", path.display()))
    })?;
    let parsed: PipegenProjectFile = serde_yaml::from_str(&content).map_err(|e| {
        PipegenError::ProjectInvalid(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_sql_gateway_url_from_rest_port() {
        assert_eq!(
            derive_sql_url("http://gateway.local:8081"),
            "http://gateway.local:8083"
        );
    }

    #[test]
    fn leaves_non_default_port_unchanged() {
        assert_eq!(
            derive_sql_url("http://gateway.local:9000"),
            "http://gateway.local:9000"
        );
    }

    fn base_config(dir: &Path) -> RunConfig {
        RunConfig {
            project_dir: dir.to_path_buf(),
            message_rate: 50.0,
            duration: Duration::from_secs(2),
            pipeline_timeout: Duration::from_secs(30),
            expected_messages: 0,
            cleanup: true,
            dry_run: false,
            bootstrap_servers: "localhost:9092".into(),
            sql_gateway_rest_url: "http://localhost:8081".into(),
            sql_gateway_sql_url: String::new(),
            flink_url: "http://localhost:8081".into(),
            schema_registry_url: "http://localhost:8085".into(),
            local_mode: true,
            traffic_pattern: String::new(),
            kafka: KafkaConfig::default(),
            session_mode: SessionMode::PerRun,
            csv_mode: false,
            generate_report: false,
            reports_dir: None,
        }
    }

    #[test]
    fn rejects_non_positive_rate() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.message_rate = 0.0;
        assert!(cfg.normalize().is_err());
    }

    #[test]
    fn rejects_duration_exceeding_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.duration = Duration::from_secs(60);
        cfg.pipeline_timeout = Duration::from_secs(30);
        assert!(cfg.normalize().is_err());
    }

    #[test]
    fn applies_project_file_overlay() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pipegen.yaml"),
            "message_rate: 123.0\npartitions: 6\n",
        )
        .unwrap();
        let cfg = base_config(dir.path()).normalize().unwrap();
        assert_eq!(cfg.message_rate, 123.0);
        assert_eq!(cfg.kafka.partitions, 6);
    }
}
