// src/registry/mod.rs
mod checker;
mod http;
mod tcp;

pub use checker::{Checker, DeactivatedChecker, ProbeError, ProbeOutcome};
pub use http::HttpChecker;
pub use tcp::TcpChecker;

use crate::config::{CheckerConfig, ModuleConfig};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RegisteredModule {
    pub name: String,
    pub checks: Vec<String>,
    pub validity: Duration,
    pub checker: Arc<dyn Checker>,
}

#[derive(Clone, Default)]
pub struct CheckerRegistry {
    modules: Vec<RegisteredModule>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. Registering a name twice replaces the earlier entry.
    pub fn register<S: Into<String>>(
        mut self,
        name: S,
        checks: Vec<String>,
        validity: Duration,
        checker: Arc<dyn Checker>,
    ) -> Self {
        let name = name.into();
        self.modules.retain(|m| m.name != name);
        self.modules.push(RegisteredModule {
            name,
            checks,
            validity,
            checker,
        });
        self
    }

    pub fn from_config(
        modules: &[ModuleConfig],
        probe_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut registry = Self::new();

        for module in modules {
            let checker: Arc<dyn Checker> = if !module.enabled {
                Arc::new(DeactivatedChecker)
            } else {
                match &module.checker {
                    CheckerConfig::Http { targets } => {
                        Arc::new(HttpChecker::new(targets.clone(), probe_timeout)?)
                    }
                    CheckerConfig::Tcp { targets } => {
                        Arc::new(TcpChecker::new(targets.clone(), probe_timeout))
                    }
                }
            };

            tracing::info!(
                "Registered module {} ({} checker, checks: {:?})",
                module.name,
                checker.kind(),
                module.check_names()
            );
            registry = registry.register(
                module.name.clone(),
                module.check_names(),
                module.validity(),
                checker,
            );
        }

        Ok(registry)
    }

    pub fn get(&self, module: &str) -> Option<&RegisteredModule> {
        self.modules.iter().find(|m| m.name == module)
    }

    pub fn modules(&self) -> &[RegisteredModule] {
        &self.modules
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::health::HealthStatus;

    #[tokio::test]
    async fn test_from_config_keeps_order_and_deactivates() {
        let config = parse_config(
            r#"
instance_id: test
modules:
  - name: tracer
    enabled: false
    checker:
      type: http
      targets:
        agent: "http://localhost:5778/"
        collector: "http://localhost:14269/"
  - name: datastore
    checker:
      type: tcp
      targets:
        ping: "127.0.0.1:26257"
"#,
            true,
        )
        .unwrap();

        let registry = CheckerRegistry::from_config(&config.modules, Duration::from_secs(1)).unwrap();
        assert_eq!(registry.module_names(), vec!["tracer", "datastore"]);

        let tracer = registry.get("tracer").unwrap();
        assert_eq!(tracer.checker.kind(), "deactivated");
        assert_eq!(tracer.checks, vec!["agent", "collector"]);

        let outcome = tracer.checker.probe("agent").await.unwrap();
        assert_eq!(outcome.status, HealthStatus::Deactivated);

        assert_eq!(registry.get("datastore").unwrap().checker.kind(), "tcp");
        assert!(registry.get("search").is_none());
    }

    #[test]
    fn test_register_replaces_existing_name() {
        let registry = CheckerRegistry::new()
            .register("a", vec!["x".into()], Duration::from_secs(1), Arc::new(DeactivatedChecker))
            .register("a", vec!["y".into()], Duration::from_secs(2), Arc::new(DeactivatedChecker));

        assert_eq!(registry.modules().len(), 1);
        assert_eq!(registry.get("a").unwrap().checks, vec!["y"]);
    }
}
