//! Error types for the mask renderer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Detector output was malformed; the frame is skipped
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Mesh or texture could not be loaded
    #[error("Failed to load asset {}: {reason}", path.display())]
    AssetLoadError { path: PathBuf, reason: String },

    /// Writing a mesh snapshot failed
    #[error("Export error: {0}")]
    ExportError(String),

    /// A tunable is out of range
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Session log could not be written or read
    #[error("Session log error: {0}")]
    RecordError(String),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn asset(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::AssetLoadError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error only affects the current frame
    pub fn is_per_frame(&self) -> bool {
        matches!(self, Error::InvalidFrame(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_error_names_path() {
        let err = Error::asset("assets/face.obj", "missing");
        let msg = err.to_string();
        assert!(msg.contains("assets/face.obj"));
        assert!(msg.contains("missing"));
        assert!(!err.is_per_frame());
    }

    #[test]
    fn test_invalid_frame_is_per_frame() {
        assert!(Error::InvalidFrame("467 landmarks".into()).is_per_frame());
    }
}
