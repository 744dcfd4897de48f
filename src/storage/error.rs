//! Error taxonomy for the storage layer
//!
//! None of these reach readers: load failures degrade to an empty map and
//! write failures surface only as the boolean returned by `commit()`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ValueError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read preferences file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse preferences: {0}")]
    Parse(String),

    #[error("Failed to write preferences file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize preferences: {0}")]
    Serialize(String),

    #[error("Permission denied creating {path}: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Preferences file {0} was modified externally")]
    ExternalModification(PathBuf),

    #[error("Cannot store value: {0}")]
    InvalidValue(#[from] ValueError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error("Failed to start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PrefValue, ValueKind};

    #[test]
    fn value_errors_convert_to_invalid_value() {
        let err: StoreError = PrefValue::parse(ValueKind::Long, "ten").unwrap_err().into();
        assert!(matches!(err, StoreError::InvalidValue(_)));
        assert!(err.to_string().starts_with("Cannot store value: "));
    }
}
