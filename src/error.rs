//! Error types for json_to_docx.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting a JSON document.
#[derive(Error, Debug)]
pub enum Error {
    /// The input JSON file does not exist or is not a regular file.
    #[error("input file does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The input is not valid JSON or its root is not an object.
    #[error("JSON parse failed: {0}")]
    InputParse(String),

    /// An image could not be found, read or decoded.
    #[error("failed to load image {}: {reason}", path.display())]
    ImageLoad { path: PathBuf, reason: String },

    /// An SVG image could not be rasterized.
    #[error("SVG conversion failed for {}: {reason}", path.display())]
    ImageConversion { path: PathBuf, reason: String },

    /// Assembling or packaging the document failed.
    #[error("document generation failed: {0}")]
    Generation(String),

    /// The finished document could not be written.
    #[error("failed to write {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error while reading input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InputParse(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Generation(err.to_string())
    }
}
