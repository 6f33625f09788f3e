//! Durable count of successful copies.
//!
//! The counter file holds nothing but the decimal value. Writes go to a
//! sibling temporary file which is synced and then renamed over the counter,
//! so a crash leaves either the old or the new value on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("failed to persist copy counter to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("copy counter is already at its maximum ({max})")]
    Overflow { max: u64 },
}

/// Result of an increment. The in-memory value is updated even when
/// persisting fails. At the maximum the value is left as it is.
#[derive(Debug)]
pub struct CounterUpdate {
    pub value: u64,
    pub persisted: Result<(), CounterError>,
}

pub struct CounterStore {
    path: PathBuf,
    value: Mutex<u64>,
}

impl CounterStore {
    /// Create a store starting at 0. Call [`CounterStore::load`] to read the
    /// persisted value.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            value: Mutex::new(0),
        }
    }

    pub async fn get(&self) -> u64 {
        *self.value.lock().await
    }

    /// Read the persisted value. Missing or unparsable files reset the counter to 0.
    pub async fn load(&self) -> u64 {
        let value = read_counter_file(&self.path).await;
        *self.value.lock().await = value;
        value
    }

    /// Increment and persist. The lock is held across the write so concurrent
    /// completions persist in increment order.
    pub async fn increment(&self) -> CounterUpdate {
        let mut value = self.value.lock().await;
        let Some(next) = value.checked_add(1) else {
            error!(count = *value, "Copy counter cannot go any higher");
            return CounterUpdate {
                value: *value,
                persisted: Err(CounterError::Overflow { max: *value }),
            };
        };
        *value = next;

        let persisted = write_counter_file(&self.path, *value).await;
        match &persisted {
            Ok(()) => debug!(count = *value, path = %self.path.display(), "Copy counter persisted"),
            Err(e) => warn!(count = *value, error = %e, "Copy counter not persisted"),
        }

        CounterUpdate {
            value: *value,
            persisted,
        }
    }
}

/// Read a counter file, falling back to 0 on any problem.
pub async fn read_counter_file(path: &Path) -> u64 {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match content.trim().parse::<u64>() {
            Ok(value) => {
                info!(count = value, path = %path.display(), "Loaded copy counter");
                value
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Copy counter file is corrupt, resetting to 0"
                );
                0
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "Copy counter file not found, starting at 0");
            0
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read copy counter file, resetting to 0"
            );
            0
        }
    }
}

async fn write_counter_file(path: &Path, value: u64) -> Result<(), CounterError> {
    let tmp_path = temp_path_for(path);

    let write = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(value.to_string().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    };

    write.await.map_err(|source| CounterError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
