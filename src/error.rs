//! Error types for Tapedeck

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error produced by transports and body streams
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for Tapedeck operations
pub type Result<T> = std::result::Result<T, TapedeckError>;

/// Errors that can occur in Tapedeck
#[derive(Debug, Error)]
pub enum TapedeckError {
    /// No unconsumed interaction in the cassette matches the live request
    #[error("Requested interaction not found: {method} {url}")]
    InteractionNotFound {
        /// Method of the live request
        method: String,
        /// URL of the live request
        url: String,
    },

    /// The real transport failed while recording
    #[error(transparent)]
    Transport(BoxError),

    /// Cassette could not be written to disk
    #[error("Failed to persist cassette {}: {source}", .path.display())]
    Persistence {
        /// Fixture path being written
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// Cassette could not be read from disk
    #[error("Failed to load cassette {}: {source}", .path.display())]
    Load {
        /// Fixture path being read
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: LoadError,
    },

    /// Recorder was used after being stopped
    #[error("Recorder already stopped")]
    Stopped,

    /// Stored interaction cannot be turned back into an HTTP response
    #[error("Invalid interaction: {0}")]
    InvalidInteraction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reasons a fixture file fails to load
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be read
    #[error("read failed: {0}")]
    Read(#[from] io::Error),

    /// File contents are not a valid cassette document
    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Document version is not one this crate understands
    #[error("unsupported cassette version {0}")]
    UnsupportedVersion(u32),

    /// A recorded response carries a status code outside 100..=999
    #[error("invalid status code {0}")]
    InvalidStatusCode(u16),
}

impl TapedeckError {
    /// Whether this error signals an exhausted or drifted fixture
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::InteractionNotFound { .. })
    }
}
