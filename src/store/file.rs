// src/store/file.rs
use super::{CacheStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::health::HealthReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    instance: String,
    report: HealthReport,
}

// <root>/<instance>/<module>/<check>.json
pub struct FileStore {
    root: PathBuf,
    instance_id: String,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    pub async fn open<P: AsRef<Path>, S: Into<String>>(
        root: P,
        instance_id: S,
    ) -> Result<Self, StoreError> {
        let instance_id = instance_id.into();
        check_segment(&instance_id)?;

        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(&instance_id)).await?;

        Ok(Self {
            root,
            instance_id,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn entry_path(&self, module: &str, check: &str) -> Result<PathBuf, StoreError> {
        check_segment(module)?;
        check_segment(check)?;
        Ok(self
            .root
            .join(&self.instance_id)
            .join(module)
            .join(format!("{}.{}", check, ENTRY_EXTENSION)))
    }

    async fn clean_dir(&self, dir: &Path, retention: Duration) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut removed = 0;
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            let stored: StoredEntry = match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(stored) => stored,
                    Err(e) => {
                        warn!("Skipping unreadable cache entry {}: {}", path.display(), e);
                        continue;
                    }
                },
                // raced with a concurrent clean
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            if stored.report.age(now) > retention {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(removed)
    }
}

// keys become path segments
fn check_segment(segment: &str) -> Result<(), StoreError> {
    let safe = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0']);
    if safe {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(segment.to_string()))
    }
}

async fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut dirs = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(dirs),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self, module: &str, check: &str) -> Result<Option<HealthReport>, StoreError> {
        let path = self.entry_path(module, check)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredEntry = serde_json::from_slice(&bytes)?;
        Ok(Some(stored.report))
    }

    async fn write(&self, report: &HealthReport) -> Result<(), StoreError> {
        let path = self.entry_path(&report.module, &report.check)?;
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(report.key().to_string()))?;
        fs::create_dir_all(dir).await?;

        let body = serde_json::to_vec(&StoredEntry {
            instance: self.instance_id.clone(),
            report: report.clone(),
        })?;

        let tmp = dir.join(format!(".{}.{}.tmp", report.check, uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        let written = async {
            file.write_all(&body).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Persisted {} to {}", report.key(), path.display());
        Ok(())
    }

    async fn clean(&self, retention: Duration) -> Result<usize, StoreError> {
        let mut removed = 0;
        for instance_dir in subdirectories(&self.root).await? {
            for module_dir in subdirectories(&instance_dir).await? {
                removed += self.clean_dir(&module_dir, retention).await?;
            }
        }
        Ok(removed)
    }
}
