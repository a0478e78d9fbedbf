// src/scheduler/mod.rs
use crate::config::JobsConfig;
use crate::health::HealthStatus;
use crate::metrics::MetricsCollector;
use crate::orchestrator::{EngineError, Orchestrator};
use crate::store::{CacheStore, StoreError};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("refresh failed: {0}")]
    Refresh(#[from] EngineError),

    #[error("cleanup failed: {0}")]
    Cleanup(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Refresh(String),
    Cleanup,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Refresh(module) => write!(f, "refresh {}", module),
            Job::Cleanup => f.write_str("cleanup"),
        }
    }
}

pub struct Scheduler {
    orchestrator: Orchestrator,
    store: Arc<dyn CacheStore>,
    config: JobsConfig,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn CacheStore>, config: JobsConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            orchestrator,
            store,
            config,
            metrics: None,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn jobs(&self) -> Vec<(Job, Duration)> {
        let mut jobs: Vec<(Job, Duration)> = self
            .orchestrator
            .registry()
            .module_names()
            .into_iter()
            .map(|module| (Job::Refresh(module), self.config.refresh_interval()))
            .collect();
        jobs.push((Job::Cleanup, self.config.cleanup_interval()));
        jobs
    }

    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let jobs = self.jobs();
        info!(
            "Starting scheduler with {} jobs (refresh every {:?}, cleanup every {:?})",
            jobs.len(),
            self.config.refresh_interval(),
            self.config.cleanup_interval()
        );

        jobs.into_iter()
            .map(|(job, period)| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.run_job(job, period).await })
            })
            .collect()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Probe every check of `module`, bypassing the cache.
    pub async fn refresh(&self, module: &str) -> Result<HealthStatus, JobError> {
        let response = self.orchestrator.health_checks(module, "", true).await?;
        Ok(response.status)
    }

    pub async fn cleanup(&self) -> Result<usize, JobError> {
        Ok(self.store.clean(self.config.retention()).await?)
    }

    async fn run_job(self: Arc<Self>, job: Job, period: Duration) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        // spread jobs out so module refreshes don't all fire together
        let delay = self.start_delay();
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                debug!("Job {} stopped before its first run", job);
                return;
            }
        }

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(&job).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Job {} shutting down", job);
                        break;
                    }
                }
            }
        }
    }

    /// Run `job` once. Failures are logged; the next tick retries.
    pub async fn run_once(&self, job: &Job) {
        let success = match job {
            Job::Refresh(module) => match self.refresh(module).await {
                Ok(status) => {
                    if status > HealthStatus::Ok {
                        warn!("Refresh of {} completed with status {}", module, status);
                    } else {
                        debug!("Refresh of {} completed with status {}", module, status);
                    }
                    true
                }
                Err(e) => {
                    error!("Job {} failed: {}", job, e);
                    false
                }
            },
            Job::Cleanup => match self.cleanup().await {
                Ok(removed) => {
                    info!("Cleanup removed {} expired health report(s)", removed);
                    true
                }
                Err(e) => {
                    error!("Job {} failed: {}", job, e);
                    false
                }
            },
        };

        if let Some(metrics) = &self.metrics {
            let name = match job {
                Job::Refresh(_) => "refresh",
                Job::Cleanup => "cleanup",
            };
            metrics.record_job_run(name, success);
        }
    }

    fn start_delay(&self) -> Duration {
        let max = self.config.max_start_jitter();
        if max.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(Duration::ZERO..=max)
    }
}
