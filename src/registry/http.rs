// src/registry/http.rs
use super::checker::{Checker, ProbeError, ProbeOutcome};
use crate::health::HealthStatus;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Probes each check by issuing a GET against its URL.
pub struct HttpChecker {
    client: Client,
    targets: BTreeMap<String, Url>,
}

impl HttpChecker {
    pub fn new(targets: BTreeMap<String, Url>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, targets })
    }
}

fn status_for(code: reqwest::StatusCode) -> HealthStatus {
    if code.is_success() {
        HealthStatus::Ok
    } else if code.is_server_error() {
        HealthStatus::Ko
    } else {
        HealthStatus::Degraded
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, check: &str) -> Result<ProbeOutcome, ProbeError> {
        let url = self
            .targets
            .get(check)
            .ok_or_else(|| ProbeError::UnknownCheck(check.to_string()))?;

        let start = Instant::now();
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProbeError::Unreachable(e.to_string())
            } else {
                ProbeError::Failed(e.to_string())
            }
        })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let code = response.status();
        debug!("GET {} answered {} in {}ms", url, code, latency_ms);

        Ok(ProbeOutcome::new(
            status_for(code),
            serde_json::json!({
                "url": url.as_str(),
                "status_code": code.as_u16(),
                "latency_ms": latency_ms,
            }),
        ))
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}
