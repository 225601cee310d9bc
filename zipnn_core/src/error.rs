//! Error type shared by every ZipNN crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ZipNnError>;

#[derive(Debug, Error)]
pub enum ZipNnError {
    /// Unsupported backend / dtype / mode, width mismatch, lossy on raw bytes.
    /// Raised before any buffer is touched.
    #[error("configuration error: {0}")]
    Config(String),

    /// The compressed stream is malformed: bad magic, truncated header or
    /// plane table, inconsistent lengths.
    #[error("format error: {0}")]
    Format(String),

    /// The generic compressor itself failed on a plane or payload.
    #[error("{method} backend failed: {message}")]
    Backend {
        method: &'static str,
        message: String,
    },

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZipNnError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn backend(method: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            method,
            message: err.to_string(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}
