//! Filesystem-backed [`FileStore`] rooted at the router's data directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tooldesk_application::{FileStore, StoreError};
use tooldesk_domain::validate_relative_path;
use tracing::trace;

pub struct FsFileStore {
    root: PathBuf,
    next_tmp: AtomicU64,
}

impl FsFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_tmp: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_relative_path(path)?;
        Ok(self.root.join(path))
    }
}

fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_string(),
        source,
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(bytes) => {
                trace!(path, len = bytes.len(), "read_file");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path)(e)),
        }
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(path))?;
        }

        // Readers never observe a half-written file.
        let n = self.next_tmp.fetch_add(1, Ordering::Relaxed);
        let mut tmp = full.clone().into_os_string();
        tmp.push(format!(".{}.{}.tmp", std::process::id(), n));
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes).await.map_err(io_error(path))?;
        if let Err(e) = fs::rename(&tmp, &full).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(path)(e));
        }
        trace!(path, len = bytes.len(), "write_file");
        Ok(())
    }
}
