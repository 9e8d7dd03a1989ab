//! App catalog port
//!
//! The corpus of installed apps: which functions each one exposes to the
//! LLM, plus the meta-operations that create and rename apps.

use thiserror::Error;
use tooldesk_domain::{DomainError, ToolSchema};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    InvalidName(#[from] DomainError),

    #[error("App already exists: {0}")]
    AlreadyExists(String),

    #[error("App not found: {0}")]
    NotFound(String),

    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schema file {path}: {message}")]
    InvalidSchema { path: String, message: String },
}

pub trait AppCatalog: Send + Sync {
    /// Schemas published by `app`. An empty name lists every app.
    fn schemas(&self, app: &str) -> Vec<ToolSchema>;

    /// Look up a function by name across all apps.
    fn find_function(&self, function: &str) -> Option<ToolSchema>;

    fn generate_app(&self, name: &str) -> Result<(), CatalogError>;

    fn rename_app(&self, old: &str, new: &str) -> Result<(), CatalogError>;
}

/// Catalog with no apps, for routers that only serve pre-registered tools.
pub struct EmptyCatalog;

impl AppCatalog for EmptyCatalog {
    fn schemas(&self, _app: &str) -> Vec<ToolSchema> {
        Vec::new()
    }

    fn find_function(&self, _function: &str) -> Option<ToolSchema> {
        None
    }

    fn generate_app(&self, name: &str) -> Result<(), CatalogError> {
        Err(CatalogError::NotFound(name.to_string()))
    }

    fn rename_app(&self, old: &str, _new: &str) -> Result<(), CatalogError> {
        Err(CatalogError::NotFound(old.to_string()))
    }
}
