//! Error types for depot-box

use thiserror::Error;

/// Result type alias using depot-box Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in depot-box operations
#[derive(Error, Debug)]
pub enum Error {
    /// Release endpoint could not be reached or answered with a failure status
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed version payload or metadata file
    #[error("Decode error: {0}")]
    Decode(String),

    /// Metadata decoding errors from the depot-metadata crate
    #[error("Decode error: {0}")]
    Metadata(#[from] depot_metadata::MetadataError),

    /// The depot CLI (or the container runtime hosting it) failed.
    /// `stderr` is passed through exactly as the process wrote it.
    #[error("Execution error (exit code {}): {stderr}", display_exit_code(.exit_code))]
    Execution {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// SBOM directory/file absent, or an unknown bake target
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means a payload could not be decoded.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Metadata(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

fn display_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}
