//! Error types for unmark library.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for unmark operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while stripping watermarks.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading input files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input directory does not exist.
    #[error("Input directory not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The input directory holds no PDF files.
    #[error("No PDF files found in {}", .0.display())]
    NoDocuments(PathBuf),

    /// The file could not be parsed as a PDF.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// The PDF version header is not one we recognise.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The PDF document is encrypted and cannot be decrypted.
    #[error("Document is encrypted")]
    Encrypted,

    /// A detected watermark cannot be removed without damaging nearby content.
    #[error("Cannot remove watermark on page {page}: {reason}")]
    UnsupportedContent { page: u32, reason: String },

    /// The output location is not writable.
    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration value or configuration file.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error reported by the PDF object layer.
    #[error("PDF error: {0}")]
    Pdf(String),
}

impl Error {
    /// Whether this error aborts a batch run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::NoDocuments(_) | Error::Write { .. } | Error::Config(_)
        )
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Write {
            path: path.into(),
            source,
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::Pdf(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
