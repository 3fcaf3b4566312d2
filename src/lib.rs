/// Photo gallery ingestion
///
/// Turns uploaded images into a thumbnail, a low-quality placeholder and a
/// full preview, records them in a SQLite catalog and removes them again.
///
/// - `ingest`: policy, codec, naming, generation and cleanup of derivatives
/// - `state`: catalog rows and the SQLite library
/// - `gallery`: upload/list/delete on top of both
/// - `config` / `error`: settings and the error taxonomy

pub mod config;
pub mod error;
pub mod gallery;
pub mod ingest;
pub mod state;

pub use config::{GalleryConfig, IngestConfig, TierConfig};
pub use error::{ConfigError, GalleryError, IngestError};
pub use gallery::{DeleteOutcome, Gallery, UploadOutcome};
pub use ingest::{CleanupReport, DerivativeGenerator, RowRemovalPolicy, SourceUpload};
pub use state::data::{DerivativeSet, FolderId, GalleryImage, ImageRecord};
