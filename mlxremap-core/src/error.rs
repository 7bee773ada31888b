//! Error type shared by every stage of the remap pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, remapping, writing or verifying a checkpoint.
#[derive(Debug, Error)]
pub enum RemapError {
    /// The source checkpoint does not exist.
    #[error("Weight file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A source tensor the catalogue needs is absent.
    ///
    /// Only raised under [`MissingKeyPolicy::Strict`](crate::MissingKeyPolicy::Strict);
    /// best-effort remapping omits the destination key instead.
    #[error("Missing source tensor `{key}`")]
    MissingKey { key: String },

    /// Tensors could not be combined into the destination shape.
    #[error("Shape mismatch for `{key}`: {reason}")]
    ShapeMismatch { key: String, reason: String },

    /// Filesystem failure (directory creation, read or write).
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `config.json` is not a valid JSON object.
    #[error("Failed to parse {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Hub download failure.
    #[error("Download failed: {0}")]
    Fetch(#[from] hf_hub::api::sync::ApiError),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

impl RemapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn shape(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RemapError>;
