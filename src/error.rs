// ⚠️ Error Types - what the tables and the manager can fail with
//
// Lookups that miss are NOT errors: they come back as Option / bool / -1.
// Only validation failures and file problems surface as DbError.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Malformed name/date, out-of-range age, duplicate unique key, bad filter.
    /// The operation that raised it has not touched any table.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Cannot open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl DbError {
    pub fn validation(message: impl Into<String>) -> Self {
        DbError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        DbError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DbError::Validation(_))
    }

    /// The table file does not exist yet (fresh data directory)
    pub fn is_missing_file(&self) -> bool {
        matches!(self, DbError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
