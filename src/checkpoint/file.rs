//! JSON-file checkpoint store, one file per thread.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{Checkpoint, CheckpointStore};
use crate::error::{Result, TurnstileError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL: Duration = Duration::from_millis(10);

/// Stores `<dir>/<thread>.json`. Writes go to a temporary file and are
/// renamed into place.
///
/// The read-compare-rename of `put` runs under `<dir>/<thread>.lock`, created
/// exclusively, so stores in separate processes sharing a directory still
/// see each other's versions. A lock file left behind by a crashed process
/// makes writes to that thread fail after the lock timeout until it is
/// removed.
#[derive(Debug)]
pub struct FileCheckpointStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
    lock_timeout: Duration,
}

impl FileCheckpointStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long `put` and `delete` wait for another writer's lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// `~/.turnstile/checkpoints`.
    pub fn new_default() -> Self {
        Self::new(crate::config::default_home_dir().join("checkpoints"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn checkpoint_path(&self, thread_id: &str) -> PathBuf {
        let label = normalize_label(thread_id);
        let name = if label == thread_id {
            format!("{label}.json")
        } else {
            // Normalization is lossy; disambiguate with a digest of the raw id.
            let digest = Sha256::digest(thread_id.as_bytes());
            let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
            format!("{label}-{suffix}.json")
        };
        self.base_dir.join(name)
    }

    async fn lock_thread(&self, thread_id: &str) -> Result<ThreadLock> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.checkpoint_path(thread_id).with_extension("lock");
        let deadline = tokio::time::Instant::now() + self.lock_timeout;
        loop {
            let attempt = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match attempt {
                Ok(_) => return Ok(ThreadLock { path }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(TurnstileError::Checkpoint(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn read(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(thread_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let checkpoint: Checkpoint = serde_json::from_str(&raw).map_err(|e| {
            TurnstileError::Checkpoint(format!("corrupt checkpoint {}: {e}", path.display()))
        })?;
        if checkpoint.thread_id != thread_id {
            return Err(TurnstileError::Checkpoint(format!(
                "{} belongs to thread '{}'",
                path.display(),
                checkpoint.thread_id
            )));
        }
        Ok(Some(checkpoint))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        self.read(thread_id).await
    }

    async fn put(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_thread(&checkpoint.thread_id).await?;
        let found = self
            .read(&checkpoint.thread_id)
            .await?
            .map_or(0, |stored| stored.version);
        if found != checkpoint.version {
            return Err(TurnstileError::VersionConflict {
                thread_id: checkpoint.thread_id,
                expected: checkpoint.version,
                found,
            });
        }
        checkpoint.version += 1;
        checkpoint.updated_at = Utc::now();

        let path = self.checkpoint_path(&checkpoint.thread_id);
        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        let serialized = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(
            thread_id = %checkpoint.thread_id,
            version = checkpoint.version,
            path = %path.display(),
            "checkpoint written"
        );
        Ok(checkpoint)
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _lock = self.lock_thread(thread_id).await?;
        match tokio::fs::remove_file(self.checkpoint_path(thread_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Removes the lock file when dropped.
#[derive(Debug)]
struct ThreadLock {
    path: PathBuf,
}

impl Drop for ThreadLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release checkpoint lock");
        }
    }
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let out: String = trimmed
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}
