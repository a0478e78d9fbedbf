// src/registry/tcp.rs
use super::checker::{Checker, ProbeError, ProbeOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Probes each check by opening a TCP connection to `host:port`.
pub struct TcpChecker {
    targets: BTreeMap<String, String>,
    connect_timeout: Duration,
}

impl TcpChecker {
    pub fn new(targets: BTreeMap<String, String>, connect_timeout: Duration) -> Self {
        Self {
            targets,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Checker for TcpChecker {
    async fn probe(&self, check: &str) -> Result<ProbeOutcome, ProbeError> {
        let address = self
            .targets
            .get(check)
            .ok_or_else(|| ProbeError::UnknownCheck(check.to_string()))?;

        let start = Instant::now();
        let stream = match timeout(self.connect_timeout, TcpStream::connect(address.as_str())).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ProbeError::Unreachable(format!("{}: {}", address, e))),
            Err(_) => {
                return Err(ProbeError::Unreachable(format!(
                    "{}: connect timed out",
                    address
                )))
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| address.clone());

        Ok(ProbeOutcome::ok(serde_json::json!({
            "address": address,
            "peer": peer,
            "latency_ms": latency_ms,
        })))
    }

    fn kind(&self) -> &'static str {
        "tcp"
    }
}
