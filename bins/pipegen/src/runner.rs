//! C11 — Runner: orchestrates the full sequence, owning every context and
//! every entity for the duration of one run (spec §4.11, §5).

use crate::report;
use pipegen_core::config::RunConfig;
use pipegen_core::error::PipegenError;
use pipegen_core::model::Resources;
use pipegen_core::status::{PipelineStatus, StatusObserver};
use pipegen_io::producer::AvroCodec;
use pipegen_io::{BrokerAdmin, GatewayClient, MonitorOutcome, RegistryClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// State accumulated as the run progresses, so deferred cleanup can target
/// exactly what this run created regardless of where it failed.
#[derive(Default)]
struct RunState {
    topics_created: Vec<String>,
    deployment_ids: Vec<String>,
}

/// Consumer shutdown (final status report flush, commit) gets this much
/// extra runway past the pipeline deadline before the run is hard-aborted,
/// per the pipeline timeout's grace window for in-flight consumer work.
const DEADLINE_GRACE: Duration = Duration::from_secs(2);

pub async fn run(config: RunConfig) -> Result<(), PipegenError> {
    let status: Arc<PipelineStatus> = Arc::new(PipelineStatus::new());
    let root = CancellationToken::new();
    let pipeline_cancel = root.child_token();
    let mut state = RunState::default();
    let run_start = Instant::now();

    // The deadline fires cancellation cooperatively at `pipeline_timeout` so
    // in-flight work (notably the consumer) can wind down and flush status;
    // the hard `timeout` below is a backstop `DEADLINE_GRACE` later in case
    // some stage doesn't observe cancellation promptly.
    let deadline_cancel = pipeline_cancel.clone();
    let deadline_timeout = config.pipeline_timeout;
    let deadline_handle = tokio::spawn(async move {
        tokio::time::sleep(deadline_timeout).await;
        deadline_cancel.cancel();
    });

    let result = match tokio::time::timeout(
        config.pipeline_timeout + DEADLINE_GRACE,
        run_inner(&config, status.clone(), pipeline_cancel.clone(), &mut state),
    )
    .await
    {
        Ok(inner) => inner,
        Err(_) => {
            pipeline_cancel.cancel();
            Err(PipegenError::Timeout(format!(
                "pipeline timeout of {:?} exceeded",
                config.pipeline_timeout
            )))
        }
    };
    deadline_handle.abort();

    // Deferred cleanup runs on every exit path, under its own budget
    // independent of the run's (possibly already-cancelled) context.
    cleanup(&config, &state).await;

    if config.generate_report {
        let sink = report::resolve_sink(config.reports_dir.as_deref());
        if let Err(err) = sink.write_report(&status, run_start.elapsed()) {
            warn!(%err, "report generation failed, logging only");
        }
    }

    result
}

async fn run_inner(
    config: &RunConfig,
    status: Arc<PipelineStatus>,
    pipeline_cancel: CancellationToken,
    state: &mut RunState,
) -> Result<(), PipegenError> {
    let statements = pipegen_plan::load_sql(&config.project_dir)?;
    let sql_topics = pipegen_plan::extract_topics(&statements);
    let schemas = pipegen_plan::load_schemas(&config.project_dir)?;

    if sql_topics.is_empty() && schemas.is_empty() {
        return Err(PipegenError::ProjectInvalid(
            "no topics declared in SQL and no schemas/ directory present; at least one is required"
                .to_string(),
        ));
    }

    let resources = pipegen_plan::plan_resources(&statements, config.local_mode);
    info!(
        input = resources.input_topic,
        output = resources.output_topic,
        topics = resources.topics.len(),
        "resources planned"
    );

    if config.dry_run {
        info!(
            statements = statements.len(),
            schemas = schemas.len(),
            topics = ?resources.topics,
            "dry run: planning complete, skipping broker/gateway/producer/consumer"
        );
        return Ok(());
    }

    let broker = BrokerAdmin::new(&config.bootstrap_servers)?;

    // Step 5: delete any pre-existing topics under this run's names,
    // idempotent and best-effort.
    broker.delete_topics(&resources.topics).await;

    // Step 6: create this run's topics.
    broker.create_topics(&resources.topics, &config.kafka).await?;
    state.topics_created = resources.topics.clone();

    // Step 7: deploy SQL via the gateway client.
    let mut gateway = GatewayClient::new(&config.sql_gateway_sql_url, &config.flink_url);
    if config.local_mode {
        gateway.wait_until_ready(Duration::from_secs(30)).await?;
    }
    gateway.acquire_session(&config.session_mode).await?;

    let placeholders = build_placeholders(&resources, config);
    let statement_refs: Vec<(&str, &str)> = statements
        .iter()
        .map(|s| (s.name.as_str(), s.content.as_str()))
        .collect();
    let (deployment_outcome, deploy_err) = gateway
        .deploy_statements(&statement_refs, &placeholders, &pipeline_cancel)
        .await;
    state.deployment_ids = deployment_outcome.completed.clone();
    if let Some(err) = deploy_err {
        return Err(err);
    }

    // Step 8: register manually-authored schemas; non-fatal on failure.
    let registry = RegistryClient::new(&config.schema_registry_url);
    let mut codecs: HashMap<String, AvroCodec> = HashMap::new();
    for (key, schema) in &schemas {
        let subject = registry.subject_for(&resources, key);
        match registry.register(&subject, &schema.raw_text).await {
            Ok(schema_id) => match apache_avro::Schema::parse_str(&schema.raw_text) {
                Ok(parsed) => {
                    codecs.insert(key.clone(), AvroCodec { schema: parsed, schema_id });
                }
                Err(err) => warn!(%err, key, "failed to parse own schema after registering"),
            },
            Err(err) => warn!(%err, subject, "schema registration failed, continuing without a codec"),
        }
    }

    // Step 9: allow the job to initialize.
    tokio::time::sleep(Duration::from_secs(3)).await;

    let traffic = pipegen_plan::parse_traffic_pattern(&config.traffic_pattern, config.message_rate)?;

    // Step 10/11: producer, bounded by its own duration-scoped child token.
    let mut producer_sent: Option<u64> = None;
    if !config.csv_mode {
        let duration_cancel = pipeline_cancel.child_token();
        let deadline_token = duration_cancel.clone();
        let deadline_handle = tokio::spawn(async move {
            tokio::time::sleep(config.duration).await;
            deadline_token.cancel();
        });

        let input_codec = codecs.get("input");
        let producer_handle = tokio::spawn(pipegen_io::run_producer(
            config.bootstrap_servers.clone(),
            resources.input_topic.clone(),
            input_codec.map(|c| AvroCodec {
                schema: c.schema.clone(),
                schema_id: c.schema_id,
            }),
            traffic.clone(),
            status.clone() as Arc<dyn StatusObserver>,
            duration_cancel,
        ));

        let outcome = producer_handle.await.map_err(|e| {
            PipegenError::ProducerError(format!("producer task panicked: {e}"))
        })?;
        let _ = deadline_handle.await;
        producer_sent = Some(outcome.sent);
    }

    // Step 12: wait for a processing signal from the monitor.
    let consumer_group = format!("flink_table_{}", sink_table_name(&statements));
    let monitor_outcome = pipegen_io::wait_for_processing(
        &config.flink_url,
        &broker,
        &consumer_group,
        &resources.output_topic,
        status.clone() as Arc<dyn StatusObserver>,
        &pipeline_cancel,
    )
    .await;
    match monitor_outcome {
        MonitorOutcome::JobFailed(message) => {
            return Err(PipegenError::Other(anyhow::anyhow!(message)));
        }
        MonitorOutcome::ProcessingDetected => info!("progress monitor detected processing activity"),
        MonitorOutcome::NoSignal => warn!("progress monitor found no signal, starting consumer anyway"),
    }

    // Step 13: derive expectedMessages if unset.
    let expected = if config.expected_messages > 0 {
        config.expected_messages
    } else if let Some(sent) = producer_sent {
        sent
    } else {
        (config.message_rate * config.duration.as_secs_f64()).round() as u64
    };

    // Step 14: consumer, bounded by the pipeline context. Prefer the codec
    // from a manually-registered schema; otherwise fetch whatever the
    // gateway auto-registered for the output subject, since this run may
    // never have seen that schema locally.
    let output_codec = codecs.get("output").map(|c| c.schema.clone());
    let resolved_output_schema = match output_codec {
        Some(schema) => Some(schema),
        None => {
            let subject = registry.subject_for(&resources, "output");
            match registry.get_latest(&subject).await {
                Ok((_, schema_text)) => apache_avro::Schema::parse_str(&schema_text).ok(),
                Err(_) => None,
            }
        }
    };

    let consumer_outcome = pipegen_io::run_consumer(
        &config.bootstrap_servers,
        &resources.output_topic,
        resolved_output_schema.as_ref(),
        expected,
        status.clone() as Arc<dyn StatusObserver>,
        pipeline_cancel.clone(),
    )
    .await;

    info!(
        consumed = consumer_outcome.consumed,
        decode_errors = consumer_outcome.decode_errors,
        expected,
        "consumer finished"
    );

    Ok(())
}

fn build_placeholders<'a>(resources: &'a Resources, config: &'a RunConfig) -> HashMap<&'a str, &'a str> {
    let mut map = HashMap::new();
    map.insert("INPUT_TOPIC", resources.input_topic.as_str());
    map.insert("OUTPUT_TOPIC", resources.output_topic.as_str());
    map.insert("BOOTSTRAP_SERVERS", config.bootstrap_servers.as_str());
    map.insert("SCHEMA_REGISTRY_URL", config.schema_registry_url.as_str());
    map
}

/// Derives the sink table name referenced by the consumer-group-lag signal
/// from the deployed SQL itself, per spec's open-question resolution: this
/// must not hardcode a table name. Takes the last `CREATE TABLE`
/// statement's declared name as the sink table, since SQL is deployed in
/// declared order and the output table is conventionally the final one.
fn sink_table_name(statements: &[pipegen_core::model::SQLStatement]) -> String {
    statements
        .iter()
        .rev()
        .find(|s| s.kind == pipegen_core::model::StatementKind::CreateTable)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| "output".to_string())
}

/// Cleanup (broker topic deletion + gateway job cancellation) runs under a
/// fresh timeout independent of the run's own (possibly cancelled) context,
/// per spec §5's cancellation model, so it completes even after the run
/// was aborted.
async fn cleanup(config: &RunConfig, state: &RunState) {
    if !config.cleanup {
        return;
    }

    let cleanup_budget = Duration::from_secs(15);
    let _ = tokio::time::timeout(cleanup_budget, async {
        if let Ok(broker) = BrokerAdmin::new(&config.bootstrap_servers) {
            broker.delete_topics(&state.topics_created).await;
        }

        let gateway = GatewayClient::new(&config.sql_gateway_sql_url, &config.flink_url);
        gateway.cleanup(&state.deployment_ids).await;
    })
    .await;
}
