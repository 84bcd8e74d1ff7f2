//! Object storage for note PDFs.
//!
//! Keys are relative slash-separated paths such as `notes/<uuid>.pdf`. The
//! store handle is built once at startup and shared read-only afterwards.

use crate::error::AppError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Object store capability consumed by the upload and delete flows.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), AppError>;

    /// Read the object under `key`; `None` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, AppError>;

    /// Delete the object under `key`. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

fn blob_error(action: &str, key: &str, err: impl std::fmt::Display) -> AppError {
    AppError::BlobStore(format!("{} '{}' failed: {}", action, key, err))
}

/// Filesystem-backed store rooted at a directory.
///
/// Content types are not persisted; every stored object is served as PDF.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(AppError::BlobStore(format!("Invalid blob key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }

    /// Round-trip a probe object to catch permission or mount problems at startup.
    ///
    /// # Errors
    /// Returns [`AppError::BlobStore`] naming the step that failed.
    pub async fn validate(&self) -> Result<(), AppError> {
        let probe_dir = self.root.join(".health-check");
        let probe = probe_dir.join("probe.bin");
        let data = b"noteabl-blob-health-check";

        fs::create_dir_all(&probe_dir)
            .await
            .map_err(|err| blob_error("create_dir_all", &probe_dir.display().to_string(), err))?;
        fs::write(&probe, data)
            .await
            .map_err(|err| blob_error("write", &probe.display().to_string(), err))?;
        let read_back = fs::read(&probe)
            .await
            .map_err(|err| blob_error("read", &probe.display().to_string(), err))?;
        if read_back != data {
            return Err(AppError::BlobStore(
                "Blob store health check read back different bytes".to_string(),
            ));
        }
        fs::remove_file(&probe)
            .await
            .map_err(|err| blob_error("remove_file", &probe.display().to_string(), err))?;
        let _ = fs::remove_dir(&probe_dir).await;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        tracing::debug!(key, content_type, size = bytes.len(), "blob put");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| blob_error("create_dir_all", key, err))?;
        }

        // Readers never see a partially written object.
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|err| blob_error("create", key, err))?;
        file.write_all(&bytes)
            .await
            .map_err(|err| blob_error("write", key, err))?;
        file.sync_all()
            .await
            .map_err(|err| blob_error("sync", key, err))?;
        drop(file);

        fs::rename(&temp_path, &path).await.map_err(|err| {
            tracing::warn!(key, error = %err, "blob rename failed");
            blob_error("rename", key, err)
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, AppError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(blob_error("read", key, err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(blob_error("delete", key, err)),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, (Bytes, String)>,
    puts_until_failure: Option<usize>,
    fail_deletes: bool,
}

/// In-process store with fault injection, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    state: Mutex<MemoryState>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::BlobStore("Memory blob store lock poisoned".to_string()))
    }

    /// Let the next `successes` puts succeed, then fail every later put.
    /// `None` disables put failures.
    pub fn fail_puts_after(&self, successes: Option<usize>) {
        if let Ok(mut state) = self.state() {
            state.puts_until_failure = successes;
        }
    }

    /// Make every delete fail (or succeed again).
    pub fn fail_deletes(&self, fail: bool) {
        if let Ok(mut state) = self.state() {
            state.fail_deletes = fail;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state()
            .map(|state| state.objects.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.state().map(|state| state.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content type recorded for `key`.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state()
            .ok()
            .and_then(|state| state.objects.get(key).map(|(_, content_type)| content_type.clone()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), AppError> {
        let mut state = self.state()?;
        match state.puts_until_failure {
            Some(0) => return Err(blob_error("put", key, "injected failure")),
            Some(remaining) => state.puts_until_failure = Some(remaining - 1),
            None => {}
        }
        state
            .objects
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, AppError> {
        Ok(self.state()?.objects.get(key).map(|(bytes, _)| bytes.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.fail_deletes {
            return Err(blob_error("delete", key, "injected failure"));
        }
        state.objects.remove(key);
        Ok(())
    }
}
