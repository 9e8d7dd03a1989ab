//! App corpus: the on-disk directory of installed tools.
//!
//! ```text
//! <apps_dir>/
//!   Calendar/
//!     Calendar        # tool binary
//!     schemas.json    # [{"name": ..., "description": ..., "parameters": {...}}]
//! ```
//!
//! The schema catalog is read once at startup and reloaded after every
//! meta-operation. Apps with a missing or unreadable `schemas.json` publish
//! no functions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tooldesk_application::{AppCatalog, CatalogError};
use tooldesk_domain::{ToolSchema, validate_app_name};
use tracing::{debug, warn};

const SCHEMAS_FILE: &str = "schemas.json";

pub struct AppCorpus {
    apps_dir: PathBuf,
    schemas: RwLock<Vec<ToolSchema>>,
}

impl AppCorpus {
    pub fn open(apps_dir: impl Into<PathBuf>) -> Self {
        let corpus = Self {
            apps_dir: apps_dir.into(),
            schemas: RwLock::new(Vec::new()),
        };
        corpus.reload();
        corpus
    }

    pub fn apps_dir(&self) -> &Path {
        &self.apps_dir
    }

    /// App names with a directory in the corpus, sorted.
    pub fn apps(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.apps_dir) else {
            return Vec::new();
        };
        let mut apps: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| validate_app_name(name).is_ok())
            .collect();
        apps.sort();
        apps
    }

    /// Re-read every `schemas.json`.
    pub fn reload(&self) {
        let mut all = Vec::new();
        for app in self.apps() {
            match self.read_schemas(&app) {
                Ok(schemas) => all.extend(schemas),
                Err(e) => warn!(app = %app, error = %e, "Skipping app schemas"),
            }
        }
        debug!(functions = all.len(), "Schema catalog loaded");
        *self.schemas.write().unwrap_or_else(|e| e.into_inner()) = all;
    }

    fn read_schemas(&self, app: &str) -> Result<Vec<ToolSchema>, CatalogError> {
        let path = self.apps_dir.join(app).join(SCHEMAS_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut schemas: Vec<ToolSchema> =
            serde_json::from_slice(&bytes).map_err(|e| CatalogError::InvalidSchema {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        for schema in &mut schemas {
            schema.app = app.to_string();
        }
        Ok(schemas)
    }
}

impl AppCatalog for AppCorpus {
    fn schemas(&self, app: &str) -> Vec<ToolSchema> {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| app.is_empty() || s.app == app)
            .cloned()
            .collect()
    }

    fn find_function(&self, function: &str) -> Option<ToolSchema> {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.name == function)
            .cloned()
    }

    fn generate_app(&self, name: &str) -> Result<(), CatalogError> {
        validate_app_name(name)?;
        let dir = self.apps_dir.join(name);
        fs::create_dir_all(&dir)?;
        let schemas = dir.join(SCHEMAS_FILE);
        if !schemas.exists() {
            fs::write(&schemas, "[]")?;
        }
        self.reload();
        Ok(())
    }

    fn rename_app(&self, old: &str, new: &str) -> Result<(), CatalogError> {
        validate_app_name(old)?;
        validate_app_name(new)?;
        let from = self.apps_dir.join(old);
        let to = self.apps_dir.join(new);
        if !from.is_dir() {
            return Err(CatalogError::NotFound(old.to_string()));
        }
        if to.exists() {
            return Err(CatalogError::AlreadyExists(new.to_string()));
        }
        fs::rename(&from, &to)?;
        let binary = to.join(old);
        if binary.exists() {
            fs::rename(&binary, to.join(new))?;
        }
        self.reload();
        Ok(())
    }
}
