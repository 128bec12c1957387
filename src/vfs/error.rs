//! Error surface of the stream-wrapper layer.
//!
//! `NotFound` is an expected outcome, `Io` is a transport failure from the
//! object store and is never conflated with absence.

use crate::config::ConfigError;
use crate::meta::store::MetaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The object store (or this layer) refused the operation.
    #[error("access denied on {path}: {reason}")]
    Access { path: String, reason: String },

    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("object store error: {0}")]
    Io(#[from] anyhow::Error),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn access(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Access {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn open(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ConfigError> for FsError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

pub type FsResult<T> = Result<T, FsError>;
