// src/registry/checker.rs
use crate::health::HealthStatus;
use async_trait::async_trait;

/// What a probe observed about a reachable dependency.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub detail: serde_json::Value,
}

impl ProbeOutcome {
    pub fn new(status: HealthStatus, detail: serde_json::Value) -> Self {
        Self { status, detail }
    }

    pub fn ok(detail: serde_json::Value) -> Self {
        Self::new(HealthStatus::Ok, detail)
    }
}

/// The probe could not be run at all.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("unknown check {0}")]
    UnknownCheck(String),

    #[error("dependency unreachable: {0}")]
    Unreachable(String),

    #[error("probe failed: {0}")]
    Failed(String),
}

/// Health probe for one module. An unhealthy but reachable dependency is an
/// `Ok` outcome with a non-OK status; `Err` means the probe could not run.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn probe(&self, check: &str) -> Result<ProbeOutcome, ProbeError>;

    fn kind(&self) -> &'static str;
}

/// Stands in for a module switched off in configuration.
pub struct DeactivatedChecker;

#[async_trait]
impl Checker for DeactivatedChecker {
    async fn probe(&self, _check: &str) -> Result<ProbeOutcome, ProbeError> {
        Ok(ProbeOutcome::new(
            HealthStatus::Deactivated,
            serde_json::json!({ "enabled": false }),
        ))
    }

    fn kind(&self) -> &'static str {
        "deactivated"
    }
}
