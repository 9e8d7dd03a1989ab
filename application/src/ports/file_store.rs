//! File store port
//!
//! Host-owned working directory served through `read_file` / `write_file`.
//! Paths are relative; writes replace the file atomically.

use async_trait::async_trait;
use thiserror::Error;
use tooldesk_domain::DomainError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    InvalidPath(#[from] DomainError),

    #[error("Storage I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
}
