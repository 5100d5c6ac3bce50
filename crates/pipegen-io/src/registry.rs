//! C6 — Registry Client: a small `reqwest`-based client for the
//! Confluent-compatible schema registry HTTP surface.

use pipegen_core::error::PipegenError;
use pipegen_core::model::Resources;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct LatestSchemaResponse {
    id: i32,
    schema: String,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with static config"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `input` -> `<inputTopic>-value`; `output` -> `<outputTopic>-value`;
    /// anything else -> `<prefix>-<key>-value`.
    pub fn subject_for(&self, resources: &Resources, schema_key: &str) -> String {
        match schema_key {
            "input" => format!("{}-value", resources.input_topic),
            "output" => format!("{}-value", resources.output_topic),
            other => format!("{}-{other}-value", resources.prefix),
        }
    }

    /// Registers `schema_text` under `subject`. If an equivalent schema is
    /// already registered, the registry's own dedupe semantics return the
    /// existing ID, which this just passes through.
    pub async fn register(&self, subject: &str, schema_text: &str) -> Result<i32, PipegenError> {
        let url = format!("{}/subjects/{subject}/versions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest { schema: schema_text })
            .send()
            .await
            .map_err(|e| PipegenError::RegistryError(format!("register {subject}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipegenError::RegistryError(format!(
                "register {subject} failed with {status}: {body}"
            )));
        }

        let parsed: RegisterResponse = response
            .json()
            .await
            .map_err(|e| PipegenError::RegistryError(format!("register {subject} body: {e}")))?;
        Ok(parsed.id)
    }

    /// `getLatest(subject) -> (schemaID, schemaText)`.
    pub async fn get_latest(&self, subject: &str) -> Result<(i32, String), PipegenError> {
        let url = format!("{}/subjects/{subject}/versions/latest", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PipegenError::RegistryError(format!("get_latest {subject}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PipegenError::RegistryError(format!(
                "no registered schema found for subject {subject}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipegenError::RegistryError(format!(
                "get_latest {subject} failed with {status}: {body}"
            )));
        }

        let parsed: LatestSchemaResponse = response
            .json()
            .await
            .map_err(|e| PipegenError::RegistryError(format!("get_latest {subject} body: {e}")))?;
        Ok((parsed.id, parsed.schema))
    }

    /// Best-effort existence check against `GET /subjects`, used only to
    /// decide whether to attempt registration at all; failures here are
    /// logged and treated as "subject not present" so the caller still
    /// attempts registration.
    pub async fn subjects(&self) -> Vec<String> {
        let url = format!("{}/subjects", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                response.json::<Vec<String>>().await.unwrap_or_default()
            }
            Ok(response) => {
                debug!(status = %response.status(), "subjects listing returned non-2xx");
                Vec::new()
            }
            Err(err) => {
                warn!(%err, "failed to list subjects");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipegen_core::model::Resources;

    fn resources() -> Resources {
        Resources {
            prefix: "pipegen-20260101-000000-abcd1234".into(),
            input_topic: "input-events".into(),
            output_topic: "output-results".into(),
            topics: vec!["input-events".into(), "output-results".into()],
        }
    }

    #[test]
    fn subject_for_input_and_output_use_topic_names() {
        let client = RegistryClient::new("http://localhost:8085");
        let resources = resources();
        assert_eq!(client.subject_for(&resources, "input"), "input-events-value");
        assert_eq!(client.subject_for(&resources, "output"), "output-results-value");
    }

    #[test]
    fn subject_for_other_keys_use_prefix() {
        let client = RegistryClient::new("http://localhost:8085");
        let resources = resources();
        assert_eq!(
            client.subject_for(&resources, "sidecar"),
            "pipegen-20260101-000000-abcd1234-sidecar-value"
        );
    }
}
