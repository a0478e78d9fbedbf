// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("instance_id must not be empty")]
    MissingInstanceId,

    #[error("no modules configured")]
    NoModules,

    #[error("invalid name {0:?}: only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("module {0} is declared more than once")]
    DuplicateModule(String),

    #[error("module {0} declares no checks")]
    NoChecks(String),

    #[error("module {0} has a zero validity")]
    ZeroValidity(String),

    #[error("retention ({retention:?}) is shorter than the validity of module {module} ({validity:?})")]
    RetentionBelowValidity {
        module: String,
        retention: Duration,
        validity: Duration,
    },

    #[error("{0} must be greater than zero")]
    ZeroSetting(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Partitions the cache between deployed replicas of the service.
    pub instance_id: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub modules: Vec<ModuleConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_id.trim().is_empty() {
            return Err(ConfigError::MissingInstanceId);
        }
        if self.modules.is_empty() {
            return Err(ConfigError::NoModules);
        }
        if self.engine.probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroSetting("engine.probe_timeout_ms"));
        }
        if self.engine.max_parallel_probes == 0 {
            return Err(ConfigError::ZeroSetting("engine.max_parallel_probes"));
        }
        if self.jobs.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroSetting("jobs.refresh_interval_secs"));
        }
        if self.jobs.cleanup_interval_secs == 0 {
            return Err(ConfigError::ZeroSetting("jobs.cleanup_interval_secs"));
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            validate_name(&module.name)?;
            if !seen.insert(module.name.as_str()) {
                return Err(ConfigError::DuplicateModule(module.name.clone()));
            }

            let checks = module.check_names();
            if module.enabled && checks.is_empty() {
                return Err(ConfigError::NoChecks(module.name.clone()));
            }
            for check in &checks {
                validate_name(check)?;
            }

            if module.validity_secs == 0 {
                return Err(ConfigError::ZeroValidity(module.name.clone()));
            }
            if self.jobs.retention() < module.validity() {
                return Err(ConfigError::RetentionBelowValidity {
                    module: module.name.clone(),
                    retention: self.jobs.retention(),
                    validity: module.validity(),
                });
            }
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidName(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_max_parallel_probes")]
    pub max_parallel_probes: usize,
}

impl EngineConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            max_parallel_probes: default_max_parallel_probes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_max_start_jitter_ms")]
    pub max_start_jitter_ms: u64,
}

impl JobsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn max_start_jitter(&self) -> Duration {
        Duration::from_millis(self.max_start_jitter_ms)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_secs: default_refresh_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_secs: default_retention_secs(),
            max_start_jitter_ms: default_max_start_jitter_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    File { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_validity_secs")]
    pub validity_secs: u64,
    pub checker: CheckerConfig,
}

impl ModuleConfig {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }

    pub fn check_names(&self) -> Vec<String> {
        match &self.checker {
            CheckerConfig::Http { targets } => targets.keys().cloned().collect(),
            CheckerConfig::Tcp { targets } => targets.keys().cloned().collect(),
        }
    }
}

/// How a module's checks reach their dependency. Keys of `targets` are the
/// module's check names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckerConfig {
    Http { targets: BTreeMap<String, Url> },
    Tcp { targets: BTreeMap<String, String> },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_max_parallel_probes() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_start_jitter_ms() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_validity_secs() -> u64 {
    60
}
