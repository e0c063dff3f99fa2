//! Error types for masked-io.
//!
//! Writing through a [`MaskedWriter`](crate::MaskedWriter) only ever fails
//! with the sink's own [`std::io::Error`], returned unchanged. The types here
//! cover the surrounding plumbing: loading configuration from files and the
//! environment.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for masked-io operations.
#[derive(Debug, Error)]
pub enum MaskError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error occurred while reading a file.
    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl MaskError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a file read error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::ConfigParse(_))
    }
}

/// Result type alias for masked-io operations.
pub type Result<T> = std::result::Result<T, MaskError>;
