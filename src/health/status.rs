// src/health/status.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a health check, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Deactivated,
    Ok,
    Degraded,
    Ko,
}

impl HealthStatus {
    /// Worst-of aggregation. An empty set aggregates to `Ok`.
    pub fn aggregate<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses.into_iter().max().unwrap_or(HealthStatus::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Deactivated => "DEACTIVATED",
            HealthStatus::Ok => "OK",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Ko => "KO",
        }
    }

    /// Numeric level used by the status gauge.
    pub fn level(&self) -> i64 {
        match self {
            HealthStatus::Deactivated => -1,
            HealthStatus::Ok => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Ko => 2,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
