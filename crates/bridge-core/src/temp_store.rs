use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::Result;

/// Scratch directory for downloaded and converted media.
///
/// Every reserved name is unique within the process (timestamp + pid + counter),
/// so concurrent relays never touch each other's files and no locking is needed.
#[derive(Debug)]
pub struct TempStore {
    dir: PathBuf,
    counter: AtomicU64,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            counter: AtomicU64::new(1),
        })
    }

    /// A fresh path inside the scratch dir. Nothing is created on disk.
    pub fn reserve(&self, extension: &str) -> PathBuf {
        let ts = chrono::Utc::now().timestamp_millis();
        let pid = std::process::id();
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let ext = extension.trim_start_matches('.');
        let name = if ext.is_empty() {
            format!("media_{ts}_{pid}_{n}")
        } else {
            format!("media_{ts}_{pid}_{n}.{ext}")
        };
        self.dir.join(name)
    }

    /// Remove a reserved path. Missing files are fine; other failures are
    /// logged and swallowed.
    pub async fn release(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "temp file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "failed to remove temp file: {e}"),
        }
    }

    fn release_blocking(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "failed to remove temp file: {e}"),
        }
    }
}

/// The temp paths owned by one relay invocation.
///
/// `release_all` is the normal exit; `Drop` removes whatever is left if the
/// owning task is torn down before reaching it.
#[derive(Debug)]
pub struct ArtifactScope {
    store: Arc<TempStore>,
    paths: Vec<PathBuf>,
}

impl ArtifactScope {
    pub fn new(store: Arc<TempStore>) -> Self {
        Self {
            store,
            paths: Vec::new(),
        }
    }

    pub fn reserve(&mut self, extension: &str) -> PathBuf {
        let path = self.store.reserve(extension);
        self.paths.push(path.clone());
        path
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub async fn release_all(mut self) {
        for path in std::mem::take(&mut self.paths) {
            self.store.release(&path).await;
        }
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            self.store.release_blocking(&path);
        }
    }
}
