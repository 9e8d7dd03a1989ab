//! Persisted instance formats.

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Serialization format of a persisted instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    #[default]
    Json,
    Xml,
}

impl StorageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StorageFormat::Json => "json",
            StorageFormat::Xml => "xml",
        }
    }

    /// Guess the format from a file extension, defaulting to JSON.
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((_, ext)) if ext.eq_ignore_ascii_case("xml") => StorageFormat::Xml,
            _ => StorageFormat::Json,
        }
    }
}

impl FromStr for StorageFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StorageFormat::Json),
            "xml" => Ok(StorageFormat::Xml),
            other => Err(DomainError::InvalidStorageFormat(other.to_string())),
        }
    }
}

/// Default file name for a record type: `<Struct>-<Struct>.<ext>`.
pub fn default_instance_path(type_name: &str, format: StorageFormat) -> String {
    let short = type_name.rsplit("::").next().unwrap_or(type_name);
    format!("{}-{}.{}", short, short, format.extension())
}

/// Check that `path` is a relative path without `..` components.
pub fn validate_relative_path(path: &str) -> Result<(), DomainError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.starts_with('\\')
        || path.contains(':')
        || path.split(['/', '\\']).any(|c| c == "..");
    if bad {
        Err(DomainError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}
