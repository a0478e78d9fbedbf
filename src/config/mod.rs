// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    );
    parse_config(&contents, is_yaml)
}

/// Parse and validate configuration from an in-memory document.
pub fn parse_config(contents: &str, is_yaml: bool) -> Result<Config> {
    let config: Config = if is_yaml {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")?
    };

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = r#"
instance_id: healthd-1
engine:
  probe_timeout_ms: 2000
jobs:
  retention_secs: 3600
store:
  kind: file
  path: /var/lib/healthd
modules:
  - name: datastore
    validity_secs: 60
    checker:
      type: tcp
      targets:
        ping: "127.0.0.1:26257"
  - name: tracer
    enabled: false
    checker:
      type: http
      targets:
        collector: "http://localhost:14269/"
        agent: "http://localhost:5778/"
"#;

    #[test]
    fn test_parse_yaml_with_defaults() {
        let config = parse_config(SAMPLE, true).unwrap();

        assert_eq!(config.instance_id, "healthd-1");
        assert_eq!(config.engine.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.engine.max_parallel_probes, 8);
        assert!(config.jobs.enabled);
        assert_eq!(config.jobs.refresh_interval(), Duration::from_secs(60));
        assert!(matches!(config.store, StoreConfig::File { .. }));
        assert!(!config.metrics.enabled);

        let tracer = &config.modules[1];
        assert!(!tracer.enabled);
        assert_eq!(tracer.validity(), Duration::from_secs(60));
        assert_eq!(tracer.check_names(), vec!["agent", "collector"]);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "instance_id": "a",
            "modules": [
                {"name": "search", "checker": {"type": "http", "targets": {"ping": "http://localhost:9200/"}}}
            ]
        }"#;
        let config = parse_config(json, false).unwrap();
        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.modules[0].check_names(), vec!["ping"]);
    }

    #[test]
    fn test_retention_must_cover_validity() {
        let yaml = SAMPLE.replace("retention_secs: 3600", "retention_secs: 30");
        let err = parse_config(&yaml, true).unwrap_err();
        let root = err.root_cause().to_string();
        assert!(root.contains("retention"), "unexpected error: {root}");
    }

    #[test]
    fn test_rejects_duplicate_modules() {
        let yaml = SAMPLE.replace("name: tracer", "name: datastore");
        let err = parse_config(&yaml, true).unwrap_err();
        assert!(err.root_cause().to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_unsafe_check_names() {
        let yaml = SAMPLE.replace("ping:", "\"../ping\":");
        assert!(parse_config(&yaml, true).is_err());
    }

    #[test]
    fn test_only_enabled_modules_need_checks() {
        let yaml = r#"
instance_id: healthd-1
modules:
  - name: datastore
    checker:
      type: tcp
      targets: {}
"#;
        let err = parse_config(yaml, true).unwrap_err();
        assert!(err.root_cause().to_string().contains("declares no checks"));

        let disabled = yaml.replace("  - name: datastore\n", "  - name: datastore\n    enabled: false\n");
        let config = parse_config(&disabled, true).unwrap();
        assert!(config.modules[0].check_names().is_empty());
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthd.yaml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.modules.len(), 2);

        let missing = load_config(dir.path().join("missing.yaml")).await;
        assert!(missing.is_err());
    }
}
