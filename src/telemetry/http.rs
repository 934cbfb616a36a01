//! # HTTP telemetry sink.
//!
//! Talks JSON to the remote logs backend:
//! ```text
//! POST  {url}/api/experiments/                 create experiment (idempotent)
//! POST  {url}/api/experiments_runs/            create run  → {"run_id": ..}
//! POST  {url}/api/logs/{run_id}/               buffered log records
//! PATCH {url}/api/experiments_runs/{run_id}/   RunPatch
//! ```
//! If the run cannot be created every later call fails with
//! [`TelemetryError::NoRunId`]; the monitor logs and ignores it.
//! Every request is bounded by [`TelemetryConfig::request_timeout`].

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::core::{Credentials, ExperimentInfo, TelemetryConfig};
use crate::error::TelemetryError;

use super::sink::{LogRecord, RunPatch, TelemetrySink};

#[derive(Deserialize)]
struct RunCreated {
    run_id: serde_json::Value,
}

/// Sink backed by the remote logs HTTP API.
pub struct HttpTelemetry {
    client: Client,
    url: String,
    credentials: Option<Credentials>,
    run_id: Option<String>,
    buffer: Mutex<Vec<LogRecord>>,
}

impl HttpTelemetry {
    /// Creates the experiment and the run on the backend.
    ///
    /// Only fails if the HTTP client cannot be built. Connection problems are
    /// logged and leave the sink without a run.
    pub async fn connect(cfg: &TelemetryConfig, info: &ExperimentInfo) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .connect_timeout(cfg.request_timeout)
            .build()?;
        let mut sink = Self {
            client,
            url: cfg.url.trim_end_matches('/').to_string(),
            credentials: cfg.credentials.clone(),
            run_id: None,
            buffer: Mutex::new(Vec::new()),
        };

        if let Err(err) = sink.create_experiment(&info.name).await {
            tracing::error!(target: "expvisor::telemetry", error = %err, "failed to create remote experiment");
        }
        match sink.create_run(info).await {
            Ok(run_id) => {
                tracing::debug!(target: "expvisor::telemetry", %run_id, url = %sink.url, "forwarding logs");
                sink.run_id = Some(run_id);
            }
            Err(err) => {
                tracing::error!(target: "expvisor::telemetry", error = %err, "failed to create remote run");
            }
        }
        Ok(sink)
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{}", self.url, path));
        match &self.credentials {
            Some(c) => req.basic_auth(&c.username, Some(&c.password)),
            None => req,
        }
    }

    async fn create_experiment(&self, name: &str) -> Result<(), TelemetryError> {
        let resp = self
            .request(Method::POST, "/api/experiments/")
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        let code = resp.status();
        if code.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        if code == StatusCode::BAD_REQUEST && body.contains("already exists") {
            return Ok(());
        }
        Err(TelemetryError::Status {
            code: code.as_u16(),
            body,
        })
    }

    async fn create_run(&self, info: &ExperimentInfo) -> Result<String, TelemetryError> {
        let resp = self
            .request(Method::POST, "/api/experiments_runs/")
            .json(&serde_json::json!({
                "experiment_name": &*info.name,
                "number_of_configs": info.paramsets.len(),
            }))
            .send()
            .await?;
        let resp = check(resp).await?;
        let created: RunCreated = resp.json().await?;
        Ok(match created.run_id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, TelemetryError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let code = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(TelemetryError::Status { code, body })
}

#[async_trait]
impl TelemetrySink for HttpTelemetry {
    fn push(&self, record: LogRecord) {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    async fn flush(&self) -> Result<(), TelemetryError> {
        let batch: Vec<LogRecord> = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(|e| e.into_inner()));
        if batch.is_empty() {
            return Ok(());
        }
        let run_id = self.run_id.as_deref().ok_or(TelemetryError::NoRunId)?;
        let resp = self
            .request(Method::POST, &format!("/api/logs/{run_id}/"))
            .json(&batch)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    async fn patch_run(&self, patch: RunPatch) -> Result<(), TelemetryError> {
        let run_id = self.run_id.as_deref().ok_or(TelemetryError::NoRunId)?;
        let resp = self
            .request(Method::PATCH, &format!("/api/experiments_runs/{run_id}/"))
            .json(&patch)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }
}
