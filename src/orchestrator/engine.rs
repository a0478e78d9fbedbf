// src/orchestrator/engine.rs
use super::flight::{FlightError, SingleFlight};
use crate::clock::{Clock, SystemClock};
use crate::health::{CheckHealth, CheckKey, HealthReport, HealthResponse, HealthStatus, ModuleHealth};
use crate::metrics::{CacheLookup, MetricsCollector, ProbeResult};
use crate::registry::CheckerRegistry;
use crate::store::CacheStore;
use crate::validation::{ValidationError, Validator};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_PARALLEL: usize = 8;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("execution of {0} was cancelled before completing")]
    Aborted(String),
}

/// Entry point for every health request, from callers and scheduled refreshes alike.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<CheckerRegistry>,
    validator: Arc<Validator>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<CheckKey, HealthReport>,
    metrics: Option<Arc<MetricsCollector>>,
    probe_timeout: Duration,
    max_parallel: usize,
}

impl Orchestrator {
    pub fn new(registry: CheckerRegistry, store: Arc<dyn CacheStore>) -> Self {
        let validator = Validator::from_registry(&registry);
        Self {
            registry: Arc::new(registry),
            validator: Arc::new(validator),
            store,
            clock: Arc::new(SystemClock),
            flights: SingleFlight::new(),
            metrics: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn registry(&self) -> &CheckerRegistry {
        &self.registry
    }

    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// Empty `module` selects every module, empty `check` every check of it.
    pub async fn health_checks(
        &self,
        module: &str,
        check: &str,
        no_cache: bool,
    ) -> Result<HealthResponse, EngineError> {
        self.validator.authorize(module, check)?;

        let groups = self.expand(module, check);
        let targets: Vec<CheckKey> = groups
            .iter()
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect();
        debug!(
            "Resolving {} check(s) for module {:?} check {:?} (no_cache={})",
            targets.len(),
            module,
            check,
            no_cache
        );

        // resolved in completion order, then put back in target order
        let mut resolved: Vec<(usize, Result<HealthReport, EngineError>)> =
            stream::iter(targets.into_iter().enumerate())
                .map(|(index, key)| {
                    let engine = self.clone();
                    async move { (index, engine.resolve(key, no_cache).await) }
                })
                .buffer_unordered(self.max_parallel)
                .collect()
                .await;
        resolved.sort_by_key(|(index, _)| *index);
        let mut reports = resolved
            .into_iter()
            .map(|(_, report)| report)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter();

        let modules = groups
            .into_iter()
            .map(|(name, keys)| {
                let checks: Vec<CheckHealth> = keys
                    .iter()
                    .filter_map(|_| reports.next())
                    .map(CheckHealth::from)
                    .collect();
                ModuleHealth::new(name, checks)
            })
            .collect();

        Ok(HealthResponse::new(modules))
    }

    fn expand(&self, module: &str, check: &str) -> Vec<(String, Vec<CheckKey>)> {
        self.registry
            .modules()
            .iter()
            .filter(|m| module.is_empty() || m.name == module)
            .map(|m| {
                let keys = if check.is_empty() {
                    m.checks
                        .iter()
                        .map(|c| CheckKey::new(m.name.clone(), c.clone()))
                        .collect()
                } else {
                    vec![CheckKey::new(m.name.clone(), check)]
                };
                (m.name.clone(), keys)
            })
            .collect()
    }

    async fn resolve(&self, key: CheckKey, no_cache: bool) -> Result<HealthReport, EngineError> {
        if !no_cache {
            match self.store.read(&key.module, &key.check).await {
                Ok(Some(report)) if report.is_fresh(self.clock.now()) => {
                    debug!("Serving {} from cache", key);
                    self.record_lookup(&key, CacheLookup::Hit);
                    return Ok(report);
                }
                Ok(Some(_)) => self.record_lookup(&key, CacheLookup::Stale),
                Ok(None) => self.record_lookup(&key, CacheLookup::Miss),
                Err(e) => {
                    warn!("Cache read for {} failed, probing instead: {}", key, e);
                    self.record_lookup(&key, CacheLookup::Error);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_store_error("read");
                    }
                }
            }
        }

        self.execute(key).await
    }

    async fn execute(&self, key: CheckKey) -> Result<HealthReport, EngineError> {
        let engine = self.clone();
        let probe_key = key.clone();
        let (result, leader) = self
            .flights
            .run(key.clone(), move || async move { engine.run_probe(probe_key).await })
            .await;

        if !leader {
            debug!("Joined in-flight execution of {}", key);
            if let Some(metrics) = &self.metrics {
                metrics.record_single_flight_join(&key.module);
            }
        }

        match result {
            Ok(report) => Ok(report),
            Err(FlightError::Panicked(reason)) => {
                warn!("Probe {} panicked: {}", key, reason);
                let validity = self.validity_of(&key);
                Ok(self.failure_report(
                    &key,
                    validity,
                    self.clock.now(),
                    format!("probe panicked: {}", reason),
                ))
            }
            Err(FlightError::Cancelled) => Err(EngineError::Aborted(key.to_string())),
        }
    }

    async fn run_probe(&self, key: CheckKey) -> HealthReport {
        let timestamp = self.clock.now();
        let module = match self.registry.get(&key.module) {
            Some(module) => module,
            None => {
                return self.failure_report(
                    &key,
                    Duration::ZERO,
                    timestamp,
                    "module not registered".into(),
                )
            }
        };

        let start = Instant::now();
        let result = timeout(self.probe_timeout, module.checker.probe(&key.check)).await;
        let elapsed = start.elapsed();

        let (report, probe_result) = match result {
            Ok(Ok(outcome)) => {
                let report = HealthReport {
                    module: key.module.clone(),
                    check: key.check.clone(),
                    status: outcome.status,
                    detail: outcome.detail,
                    timestamp,
                    validity: module.validity,
                };

                if report.status > HealthStatus::Ok {
                    warn!("Check {} reported {}", key, report.status);
                } else {
                    debug!("Check {} reported {} in {:?}", key, report.status, elapsed);
                }

                if let Err(e) = self.store.write(&report).await {
                    warn!("Failed to cache result of {}: {}", key, e);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_store_error("write");
                    }
                }
                (report, ProbeResult::Completed)
            }
            Ok(Err(e)) => {
                warn!("Probe {} failed: {}", key, e);
                (
                    self.failure_report(&key, module.validity, timestamp, e.to_string()),
                    ProbeResult::Failed,
                )
            }
            Err(_) => {
                warn!("Probe {} timed out after {:?}", key, self.probe_timeout);
                (
                    self.failure_report(
                        &key,
                        module.validity,
                        timestamp,
                        format!("probe timed out after {:?}", self.probe_timeout),
                    ),
                    ProbeResult::TimedOut,
                )
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_probe(&key.module, &key.check, probe_result, elapsed);
            metrics.update_check_status(&key.module, &key.check, report.status);
        }

        report
    }

    // never written to the store, so the next request probes again
    fn failure_report(
        &self,
        key: &CheckKey,
        validity: Duration,
        timestamp: DateTime<Utc>,
        error: String,
    ) -> HealthReport {
        HealthReport {
            module: key.module.clone(),
            check: key.check.clone(),
            status: HealthStatus::Ko,
            detail: serde_json::json!({ "error": error }),
            timestamp,
            validity,
        }
    }

    fn validity_of(&self, key: &CheckKey) -> Duration {
        self.registry
            .get(&key.module)
            .map(|m| m.validity)
            .unwrap_or(Duration::ZERO)
    }

    fn record_lookup(&self, key: &CheckKey, lookup: CacheLookup) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(&key.module, lookup);
        }
    }
}
