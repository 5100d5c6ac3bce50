//! # PipeGen CLI - Streaming Pipeline Runner
//!
//! Scaffolds topics and schemas, deploys SQL to a Flink-compatible gateway,
//! drives synthetic traffic in, and validates output, end to end.
//!
//! ```bash
//! pipegen run --project-dir ./my-pipeline --message-rate 50 --duration 30s
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipegen_core::config::{KafkaConfig, RunConfig, SessionMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;
mod runner;

#[derive(Parser, Debug)]
#[command(name = "pipegen")]
#[command(about = "Scaffolds and runs Kafka + Flink SQL + schema-registry streaming pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a pipeline project end to end.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Directory containing `sql/`, optional `schemas/`, and `pipegen.yaml`.
    #[arg(long)]
    project_dir: PathBuf,

    /// Target messages per second for the producer.
    #[arg(long, default_value_t = 50.0)]
    message_rate: f64,

    /// How long the producer emits records, e.g. `30s`, `2m`.
    #[arg(long, default_value = "30s", value_parser = parse_duration_arg)]
    duration: Duration,

    /// Overall budget for the run; must be >= duration.
    #[arg(long, default_value = "2m", value_parser = parse_duration_arg)]
    pipeline_timeout: Duration,

    /// 0 = auto-derive from the producer's final count.
    #[arg(long, default_value_t = 0)]
    expected_messages: u64,

    #[arg(long, default_value_t = true)]
    cleanup: bool,
    #[arg(long)]
    no_cleanup: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = "localhost:9092")]
    bootstrap_servers: String,
    #[arg(long, default_value = "http://localhost:8081")]
    flink_url: String,
    #[arg(long, default_value = "http://localhost:8081")]
    sql_gateway_url: String,
    #[arg(long, default_value = "http://localhost:8085")]
    schema_registry_url: String,

    #[arg(long)]
    local_mode: bool,

    /// Traffic pattern DSL: `0s-10s:200%,10s-20s:50%`.
    #[arg(long, default_value = "")]
    traffic_pattern: String,

    #[arg(long, default_value_t = 1)]
    partitions: i32,
    #[arg(long, default_value_t = 1)]
    replication_factor: i32,
    #[arg(long, default_value_t = 7 * 24 * 60 * 60 * 1000)]
    retention_ms: i64,

    #[arg(long)]
    shared_session: bool,
    #[arg(long, default_value = "")]
    session_name: String,

    #[arg(long)]
    csv_mode: bool,

    #[arg(long)]
    generate_report: bool,
    #[arg(long)]
    reports_dir: Option<PathBuf>,
}

fn parse_duration_arg(raw: &str) -> Result<Duration, String> {
    humantime_like_parse(raw).ok_or_else(|| format!("invalid duration: {raw}"))
}

/// Parses `<n>(h|m|s|ms)` the same way the traffic-pattern grammar does,
/// so CLI durations and traffic-pattern durations share one mental model.
fn humantime_like_parse(raw: &str) -> Option<Duration> {
    let unit_start = raw.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = raw.split_at(unit_start);
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

impl RunArgs {
    fn into_config(self) -> RunConfig {
        let session_mode = if self.shared_session {
            SessionMode::Shared {
                name: if self.session_name.is_empty() {
                    "pipegen-shared".to_string()
                } else {
                    self.session_name
                },
            }
        } else {
            SessionMode::PerRun
        };

        RunConfig {
            project_dir: self.project_dir,
            message_rate: self.message_rate,
            duration: self.duration,
            pipeline_timeout: self.pipeline_timeout,
            expected_messages: self.expected_messages,
            cleanup: self.cleanup && !self.no_cleanup,
            dry_run: self.dry_run,
            bootstrap_servers: self.bootstrap_servers,
            sql_gateway_rest_url: self.sql_gateway_url,
            sql_gateway_sql_url: String::new(),
            flink_url: self.flink_url,
            schema_registry_url: self.schema_registry_url,
            local_mode: self.local_mode,
            traffic_pattern: self.traffic_pattern,
            kafka: KafkaConfig {
                partitions: self.partitions,
                replication_factor: self.replication_factor,
                retention_ms: self.retention_ms,
            },
            session_mode,
            csv_mode: self.csv_mode,
            generate_report: self.generate_report,
            reports_dir: self.reports_dir,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => match run(args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!(%err, "pipegen run failed");
                ExitCode::from(exit_code_for(&err))
            }
        },
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.into_config().normalize().context("invalid run configuration")?;
    runner::run(config).await.map_err(anyhow::Error::from)
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<pipegen_core::error::PipegenError>() {
        Some(pipegen_err) => pipegen_err.exit_code() as u8,
        None => 1,
    }
}
