// src/health/report.rs
use super::HealthStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifies one concrete check: a module plus a non-empty check name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckKey {
    pub module: String,
    pub check: String,
}

impl CheckKey {
    pub fn new(module: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            check: check.into(),
        }
    }
}

impl fmt::Display for CheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.check)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub module: String,
    pub check: String,
    pub status: HealthStatus,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub validity: Duration,
}

impl HealthReport {
    pub fn key(&self) -> CheckKey {
        CheckKey::new(self.module.clone(), self.check.clone())
    }

    /// A report is fresh while `now - timestamp < validity`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.validity) {
            Ok(validity) => now - self.timestamp < validity,
            // validity too large to represent: treat as never expiring
            Err(_) => true,
        }
    }

    /// Age of the report at `now`; negative ages (clock skew) count as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckHealth {
    pub name: String,
    pub status: HealthStatus,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl From<HealthReport> for CheckHealth {
    fn from(report: HealthReport) -> Self {
        Self {
            name: report.check,
            status: report.status,
            detail: report.detail,
            timestamp: report.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHealth {
    pub name: String,
    pub status: HealthStatus,
    pub checks: Vec<CheckHealth>,
}

impl ModuleHealth {
    pub fn new(name: String, checks: Vec<CheckHealth>) -> Self {
        let status = HealthStatus::aggregate(checks.iter().map(|c| c.status));
        Self {
            name,
            status,
            checks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub modules: Vec<ModuleHealth>,
}

impl HealthResponse {
    pub fn new(modules: Vec<ModuleHealth>) -> Self {
        let status = HealthStatus::aggregate(modules.iter().map(|m| m.status));
        Self { status, modules }
    }

    pub fn module(&self, name: &str) -> Option<&ModuleHealth> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn check(&self, module: &str, check: &str) -> Option<&CheckHealth> {
        self.module(module)
            .and_then(|m| m.checks.iter().find(|c| c.name == check))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report_at(timestamp: DateTime<Utc>, validity_secs: u64) -> HealthReport {
        HealthReport {
            module: "store".to_string(),
            check: "ping".to_string(),
            status: HealthStatus::Ok,
            detail: serde_json::json!({}),
            timestamp,
            validity: Duration::from_secs(validity_secs),
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = report_at(t0, 60);

        assert!(report.is_fresh(t0));
        assert!(report.is_fresh(t0 + chrono::Duration::seconds(59)));
        assert!(!report.is_fresh(t0 + chrono::Duration::seconds(60)));
        assert!(!report.is_fresh(t0 + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_age_never_negative() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let report = report_at(t0, 60);
        assert_eq!(report.age(t0 - chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(
            report.age(t0 + chrono::Duration::seconds(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_response_aggregates_modules() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ok = CheckHealth::from(report_at(t0, 60));
        let mut ko = ok.clone();
        ko.name = "write".to_string();
        ko.status = HealthStatus::Ko;

        let store = ModuleHealth::new("store".to_string(), vec![ok.clone(), ko]);
        let cache = ModuleHealth::new("cache".to_string(), vec![ok]);
        assert_eq!(store.status, HealthStatus::Ko);
        assert_eq!(cache.status, HealthStatus::Ok);

        let response = HealthResponse::new(vec![cache, store]);
        assert_eq!(response.status, HealthStatus::Ko);
        assert_eq!(
            response.check("store", "write").map(|c| c.status),
            Some(HealthStatus::Ko)
        );
    }
}
