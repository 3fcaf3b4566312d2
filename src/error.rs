/// Error types for ingestion, cleanup and the gallery boundary
///
/// Every ingestion failure is surfaced to the caller as one tagged variant.
/// Nothing here is retried internally.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the derivative pipeline
#[derive(Debug, Error)]
pub enum IngestError {
    /// Declared (or actual) byte size is above the hard ceiling
    #[error("file exceeds {}MB ({size} bytes, limit {limit} bytes)", limit / (1000 * 1024))]
    HardSizeLimit { size: u64, limit: u64 },

    /// MIME type is not in the format table
    #[error("file type not supported: {mime}")]
    UnsupportedFormat { mime: String },

    /// Format cannot be rescaled and is too large to pass through
    #[error("{mime} file is bigger than {limit} bytes ({size} bytes); please convert or upload a smaller file")]
    UnsupportedSize { mime: String, size: u64, limit: u64 },

    /// Bytes do not decode as the declared type
    #[error("could not decode {format}: {reason}")]
    Decode { format: String, reason: String },

    /// A derivative could not be encoded
    #[error("could not encode {format}: {reason}")]
    Encode { format: String, reason: String },

    /// Upload directory or derivative file could not be created/written
    #[error("storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Some derivative files of a record were missing or undeletable
    #[error("cleanup incomplete: {deleted} deleted, {missing} missing, {failed} undeletable")]
    CleanupPartial {
        deleted: usize,
        missing: usize,
        failed: usize,
    },

    /// Folder ids are positive integers
    #[error("invalid folder id: {0}")]
    InvalidFolder(i64),

    /// The blocking ingestion task did not finish
    #[error("ingestion task failed: {0}")]
    Worker(String),
}

impl IngestError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IngestError::Storage {
            path: path.into(),
            source,
        }
    }

    /// HTTP status an inbound adapter should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::HardSizeLimit { .. } | IngestError::UnsupportedSize { .. } => 413,
            IngestError::UnsupportedFormat { .. } => 415,
            IngestError::InvalidFolder(_) => 400,
            IngestError::Decode { .. }
            | IngestError::Encode { .. }
            | IngestError::Storage { .. }
            | IngestError::CleanupPartial { .. }
            | IngestError::Worker(_) => 500,
        }
    }

    /// True when the upload itself was at fault (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// Failures at the gallery boundary (ingestion + catalog)
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("no image ids provided")]
    NoImageIds,
}

impl GalleryError {
    pub fn status_code(&self) -> u16 {
        match self {
            GalleryError::Ingest(e) => e.status_code(),
            GalleryError::Catalog(_) => 500,
            GalleryError::NoImageIds => 400,
        }
    }
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
