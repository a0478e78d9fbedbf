// src/metrics/collector.rs
use crate::health::HealthStatus;
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Completed,
    Failed,
    TimedOut,
}

impl ProbeResult {
    fn as_str(&self) -> &'static str {
        match self {
            ProbeResult::Completed => "completed",
            ProbeResult::Failed => "failed",
            ProbeResult::TimedOut => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
    Stale,
    Error,
}

impl CacheLookup {
    fn as_str(&self) -> &'static str {
        match self {
            CacheLookup::Hit => "hit",
            CacheLookup::Miss => "miss",
            CacheLookup::Stale => "stale",
            CacheLookup::Error => "error",
        }
    }
}

pub struct MetricsCollector {
    // Probe metrics
    pub probe_executions_total: IntCounterVec,
    pub probe_duration_seconds: HistogramVec,
    pub check_status: IntGaugeVec,

    // Cache metrics
    pub cache_lookups_total: IntCounterVec,
    pub single_flight_joins_total: IntCounterVec,
    pub store_errors_total: IntCounterVec,

    // Scheduler metrics
    pub job_runs_total: IntCounterVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let probe_executions_total = IntCounterVec::new(
            Opts::new("health_probe_executions_total", "Probe executions by outcome"),
            &["module", "check", "result"],
        )?;
        registry.register(Box::new(probe_executions_total.clone()))?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("health_probe_duration_seconds", "Probe duration in seconds"),
            &["module", "check"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let check_status = IntGaugeVec::new(
            Opts::new(
                "health_check_status",
                "Last observed status (-1=deactivated, 0=ok, 1=degraded, 2=ko)",
            ),
            &["module", "check"],
        )?;
        registry.register(Box::new(check_status.clone()))?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new("health_cache_lookups_total", "Cache lookups by result"),
            &["module", "result"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let single_flight_joins_total = IntCounterVec::new(
            Opts::new(
                "health_single_flight_joins_total",
                "Callers that awaited an execution already in flight",
            ),
            &["module"],
        )?;
        registry.register(Box::new(single_flight_joins_total.clone()))?;

        let store_errors_total = IntCounterVec::new(
            Opts::new("health_store_errors_total", "Cache store failures by operation"),
            &["operation"],
        )?;
        registry.register(Box::new(store_errors_total.clone()))?;

        let job_runs_total = IntCounterVec::new(
            Opts::new("health_job_runs_total", "Scheduled job runs by outcome"),
            &["job", "outcome"],
        )?;
        registry.register(Box::new(job_runs_total.clone()))?;

        Ok(Self {
            probe_executions_total,
            probe_duration_seconds,
            check_status,
            cache_lookups_total,
            single_flight_joins_total,
            store_errors_total,
            job_runs_total,
        })
    }

    pub fn record_probe(&self, module: &str, check: &str, result: ProbeResult, duration: Duration) {
        self.probe_executions_total
            .with_label_values(&[module, check, result.as_str()])
            .inc();

        self.probe_duration_seconds
            .with_label_values(&[module, check])
            .observe(duration.as_secs_f64());
    }

    pub fn update_check_status(&self, module: &str, check: &str, status: HealthStatus) {
        self.check_status
            .with_label_values(&[module, check])
            .set(status.level());
    }

    pub fn record_cache_lookup(&self, module: &str, lookup: CacheLookup) {
        self.cache_lookups_total
            .with_label_values(&[module, lookup.as_str()])
            .inc();
    }

    pub fn record_single_flight_join(&self, module: &str) {
        self.single_flight_joins_total
            .with_label_values(&[module])
            .inc();
    }

    pub fn record_store_error(&self, operation: &str) {
        self.store_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_job_run(&self, job: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.job_runs_total.with_label_values(&[job, outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_exposes_recorded_series() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_probe("datastore", "ping", ProbeResult::Completed, Duration::from_millis(5));
        metrics.record_cache_lookup("datastore", CacheLookup::Hit);
        metrics.update_check_status("datastore", "ping", HealthStatus::Ko);
        metrics.record_job_run("cleanup", false);

        let text = String::from_utf8(registry.gather()).unwrap();
        let line = |name: &str| {
            text.lines()
                .find(|l| l.starts_with(name) && !l.starts_with('#'))
                .map(str::to_string)
                .unwrap_or_default()
        };

        let probes = line("health_probe_executions_total{");
        assert!(probes.contains("result=\"completed\""));
        assert!(probes.ends_with(" 1"));

        assert!(line("health_cache_lookups_total{").contains("result=\"hit\""));
        assert!(line("health_check_status{").ends_with(" 2"));
        assert!(line("health_job_runs_total{").contains("outcome=\"failure\""));
    }
}
