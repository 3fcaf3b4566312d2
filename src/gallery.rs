/// Gallery boundary
///
/// Ties the derivative generator to the catalog: an upload becomes files plus
/// a row, a deletion removes files and (policy permitting) the row.

use crate::config::GalleryConfig;
use crate::error::{GalleryError, IngestError};
use crate::ingest::cleanup::{CleanupReport, RowRemovalPolicy};
use crate::ingest::codec::{Codec, ImageCodec};
use crate::ingest::generator::{DerivativeGenerator, SourceUpload};
use crate::state::data::{FolderId, GalleryImage, ImageRecord, NewImage};
use crate::state::library::Library;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

/// Result for one file of a batch upload
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum UploadOutcome {
    Uploaded { image: ImageRecord },
    Skipped {
        name: String,
        message: String,
        /// HTTP status the failure maps to
        status: u16,
    },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

/// Result for one id of a delete request
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DeleteOutcome {
    Cleaned {
        id: i64,
        /// Whether the catalog row went too
        row_removed: bool,
        report: CleanupReport,
    },
    NotFound { id: i64 },
}

impl DeleteOutcome {
    pub fn report(&self) -> Option<&CleanupReport> {
        match self {
            DeleteOutcome::Cleaned { report, .. } => Some(report),
            DeleteOutcome::NotFound { .. } => None,
        }
    }
}

pub struct Gallery<C = ImageCodec> {
    generator: DerivativeGenerator<C>,
    library: Library,
    row_removal: RowRemovalPolicy,
}

impl Gallery<ImageCodec> {
    /// Open the catalog named by `config` and serve files from its public dir
    pub fn from_config(config: &GalleryConfig) -> Result<Self, GalleryError> {
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::storage(parent, e))?;
        }

        let library = Library::open(&db_path)?;
        let generator = DerivativeGenerator::new(&config.ingest, config.public_dir.clone());
        Ok(Self::new(generator, library, config.row_removal))
    }
}

impl<C: Codec> Gallery<C> {
    pub fn new(
        generator: DerivativeGenerator<C>,
        library: Library,
        row_removal: RowRemovalPolicy,
    ) -> Self {
        Self {
            generator,
            library,
            row_removal,
        }
    }

    pub fn generator(&self) -> &DerivativeGenerator<C> {
        &self.generator
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Ingest one file and record it
    pub fn upload<R: Read>(&self, upload: SourceUpload<R>) -> Result<ImageRecord, GalleryError> {
        let name = upload.name().to_string();
        let mime_type = upload.mime_type().to_string();
        let byte_size = upload.byte_size();

        let derivatives = self.generator.ingest(upload)?;
        let new_image = NewImage {
            name,
            mime_type,
            byte_size,
            derivatives,
        };

        match self.library.add_image(&new_image) {
            Ok(record) => {
                tracing::info!(id = record.id, name = %record.name, "image recorded");
                Ok(record)
            }
            Err(e) => {
                tracing::error!(error = %e, "catalog insert failed, removing derivatives");
                let report = self.generator.cleanup(&new_image.derivatives);
                if !report.is_complete() {
                    tracing::error!(
                        failures = ?report.failures,
                        "rollback left derivatives behind"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Upload several files; a failing file is skipped, not fatal
    pub fn upload_batch<R, I>(&self, uploads: I) -> Vec<UploadOutcome>
    where
        R: Read,
        I: IntoIterator<Item = SourceUpload<R>>,
    {
        uploads
            .into_iter()
            .map(|upload| {
                let name = upload.name().to_string();
                outcome(name, self.upload(upload))
            })
            .collect()
    }

    /// Upload local files in the given order; unreadable files are skipped too
    pub fn upload_paths(
        &self,
        folder: FolderId,
        paths: &[PathBuf],
        mime_type: Option<&str>,
    ) -> Vec<UploadOutcome> {
        paths
            .iter()
            .map(|path| {
                let result = SourceUpload::from_path(folder, path, mime_type)
                    .map_err(GalleryError::from)
                    .and_then(|upload| self.upload(upload));
                outcome(path.display().to_string(), result)
            })
            .collect()
    }

    /// Gallery JSON entries for one folder
    pub fn list(&self, folder: FolderId) -> Result<Vec<GalleryImage>, GalleryError> {
        let images = self.library.get_images(folder)?;
        Ok(images.iter().map(ImageRecord::to_gallery).collect())
    }

    /// Delete the files of each image and, when the cleanup allows it, its row
    #[tracing::instrument(skip(self), fields(policy = ?self.row_removal))]
    pub fn delete_images(&self, ids: &[i64]) -> Result<Vec<DeleteOutcome>, GalleryError> {
        if ids.is_empty() {
            return Err(GalleryError::NoImageIds);
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(record) = self.library.get_image_by_id(id)? else {
                tracing::warn!(id, "no such image");
                outcomes.push(DeleteOutcome::NotFound { id });
                continue;
            };

            let report = self.generator.cleanup(&record.derivatives);
            let row_removed = if report.permits_row_removal(self.row_removal) {
                self.library.delete_image(id)?
            } else {
                tracing::warn!(id, "keeping catalog row after incomplete cleanup");
                false
            };

            outcomes.push(DeleteOutcome::Cleaned {
                id,
                row_removed,
                report,
            });
        }
        Ok(outcomes)
    }
}

fn outcome(name: String, result: Result<ImageRecord, GalleryError>) -> UploadOutcome {
    match result {
        Ok(image) => UploadOutcome::Uploaded { image },
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "skipping upload");
            UploadOutcome::Skipped {
                name,
                message: e.to_string(),
                status: e.status_code(),
            }
        }
    }
}

impl<C> std::fmt::Debug for Gallery<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery")
            .field("library", &self.library)
            .field("row_removal", &self.row_removal)
            .finish()
    }
}
