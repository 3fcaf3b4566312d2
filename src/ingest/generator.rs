/// Derivative generator
///
/// One call turns one uploaded file into a thumbnail, a low-quality preview
/// and a full preview (or a single verbatim copy), or fails leaving nothing
/// behind on disk.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ingest::cleanup::{remove_derivatives, CleanupReport};
use crate::ingest::codec::{check_signature, Bitmap, Codec, ImageCodec};
use crate::ingest::naming::{PathScheme, Role, Token};
use crate::ingest::policy::{mime_for_extension, IngestPlan, Policy, Strategy, TierPlan};
use crate::state::data::{DerivativeSet, FolderId};
use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One uploaded file, as handed over by the transport layer
#[derive(Debug)]
pub struct SourceUpload<R> {
    folder_id: FolderId,
    name: String,
    mime_type: String,
    byte_size: u64,
    reader: R,
}

impl<R: Read> SourceUpload<R> {
    pub fn new(
        folder_id: FolderId,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        byte_size: u64,
        reader: R,
    ) -> Self {
        Self {
            folder_id,
            name: name.into(),
            mime_type: mime_type.into(),
            byte_size,
            reader,
        }
    }
}

impl<R> SourceUpload<R> {
    pub fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    /// Original file name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Declared size in bytes
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }
}

impl SourceUpload<Cursor<Vec<u8>>> {
    /// In-memory upload; the declared size is the buffer length
    pub fn from_bytes(
        folder_id: FolderId,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let size = bytes.len() as u64;
        Self::new(folder_id, name, mime_type, size, Cursor::new(bytes))
    }
}

impl SourceUpload<File> {
    /// Upload from a local file; MIME type guessed from the extension when not given
    pub fn from_path(
        folder_id: FolderId,
        path: &Path,
        mime_type: Option<&str>,
    ) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|e| IngestError::storage(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| IngestError::storage(path, e))?
            .len();
        let mime = mime_type
            .or_else(|| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(mime_for_extension)
            })
            .unwrap_or("application/octet-stream");
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Ok(Self::new(folder_id, name, mime, size, file))
    }
}

/// Source after the policy and content checks
enum Prepared {
    Verbatim(Vec<u8>),
    Decoded(Bitmap),
}

/// Files written by one ingestion; unlinked on drop unless committed
#[derive(Default)]
struct StagedFiles {
    written: Vec<PathBuf>,
    committed: bool,
}

impl StagedFiles {
    /// Write to `<path>.tmp`, then rename into place
    fn write(&mut self, path: PathBuf, bytes: &[u8]) -> Result<(), IngestError> {
        let mut temp = path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        if let Err(e) = fs::write(&temp, bytes) {
            let _ = fs::remove_file(&temp);
            return Err(IngestError::storage(temp, e));
        }
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(IngestError::storage(path, e));
        }
        self.written.push(path);
        Ok(())
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.written {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "rolled back derivative"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not roll back derivative")
                }
            }
        }
    }
}

/// Turns uploads into derivative sets. Stateless apart from configuration.
#[derive(Debug, Clone)]
pub struct DerivativeGenerator<C = ImageCodec> {
    policy: Policy,
    scheme: PathScheme,
    codec: C,
}

impl DerivativeGenerator<ImageCodec> {
    pub fn new(config: &IngestConfig, public_dir: impl Into<PathBuf>) -> Self {
        Self::with_codec(config, public_dir, ImageCodec)
    }
}

impl<C: Codec> DerivativeGenerator<C> {
    pub fn with_codec(config: &IngestConfig, public_dir: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            policy: Policy::new(config),
            scheme: PathScheme::new(public_dir, config.upload_prefix.clone()),
            codec,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn scheme(&self) -> &PathScheme {
        &self.scheme
    }

    /// Produce the derivative set for one upload.
    ///
    /// Either all derivative files exist afterwards or none do.
    #[tracing::instrument(
        skip(self, upload),
        fields(folder = %upload.folder_id, mime = %upload.mime_type, size = upload.byte_size)
    )]
    pub fn ingest<R: Read>(&self, upload: SourceUpload<R>) -> Result<DerivativeSet, IngestError> {
        let plan = self
            .policy
            .classify(&upload.mime_type, upload.byte_size)
            .inspect_err(|e| tracing::warn!(error = %e, "upload rejected"))?;

        let bytes = self.read_source(upload.reader)?;
        let actual = bytes.len() as u64;
        let plan = if actual > upload.byte_size {
            tracing::warn!(declared = upload.byte_size, actual, "stream larger than declared");
            self.policy
                .classify(&upload.mime_type, actual)
                .inspect_err(|e| tracing::warn!(error = %e, "upload rejected"))?
        } else {
            plan
        };

        let prepared = match plan.strategy {
            Strategy::Passthrough => {
                check_signature(&bytes, plan.format)?;
                Prepared::Verbatim(bytes)
            }
            Strategy::Reencode => Prepared::Decoded(self.codec.decode(&bytes, plan.format)?),
        };

        let folder = upload.folder_id;
        self.scheme.ensure_folder(folder)?;
        let token = Token::generate();
        let mut staged = StagedFiles::default();

        let set = match &prepared {
            Prepared::Verbatim(bytes) => {
                self.store_verbatim(&plan, folder, &token, bytes, &mut staged)?
            }
            Prepared::Decoded(bitmap) => {
                self.write_tiers(&plan, folder, &token, bitmap, &mut staged)?
            }
        };
        staged.commit();

        tracing::info!(
            token = %token,
            strategy = ?plan.strategy,
            width = ?set.width,
            height = ?set.height,
            "ingested upload"
        );
        Ok(set)
    }

    /// Delete the files of a set, reporting per path
    pub fn cleanup(&self, set: &DerivativeSet) -> CleanupReport {
        remove_derivatives(&self.scheme, set)
    }

    /// Read at most one byte past the hard ceiling
    fn read_source<R: Read>(&self, reader: R) -> Result<Vec<u8>, IngestError> {
        let cap = self.policy.hard_ceiling().saturating_add(1);
        let mut bytes = Vec::new();
        reader
            .take(cap)
            .read_to_end(&mut bytes)
            .map_err(|e| IngestError::storage("upload stream", e))?;
        self.policy.check_hard_ceiling(bytes.len() as u64)?;
        Ok(bytes)
    }

    fn absolute(&self, relative: &str) -> Result<PathBuf, IngestError> {
        self.scheme.resolve(relative).ok_or_else(|| {
            IngestError::storage(
                relative,
                io::Error::new(io::ErrorKind::InvalidInput, "path leaves the public directory"),
            )
        })
    }

    fn store_verbatim(
        &self,
        plan: &IngestPlan,
        folder: FolderId,
        token: &Token,
        bytes: &[u8],
        staged: &mut StagedFiles,
    ) -> Result<DerivativeSet, IngestError> {
        let relative = self
            .scheme
            .relative(folder, Role::Thumb, token, plan.spec().extension);
        staged.write(self.absolute(&relative)?, bytes)?;

        Ok(DerivativeSet {
            folder_id: folder,
            width: None,
            height: None,
            ratio: None,
            path_thumb: relative.clone(),
            path_low: relative.clone(),
            path_preview: relative,
        })
    }

    fn write_tiers(
        &self,
        plan: &IngestPlan,
        folder: FolderId,
        token: &Token,
        bitmap: &Bitmap,
        staged: &mut StagedFiles,
    ) -> Result<DerivativeSet, IngestError> {
        let (width, height) = bitmap.dimensions();

        let thumb = self.codec.scale(bitmap, plan.thumbnail.max_edge);
        let path_thumb = self.write_tier(Role::Thumb, &plan.thumbnail, &thumb, folder, token, staged)?;
        drop(thumb);

        let preview = self.codec.scale(bitmap, plan.preview.max_edge);
        let low = if plan.low.max_edge == plan.preview.max_edge {
            Cow::Borrowed(&*preview)
        } else {
            self.codec.scale(bitmap, plan.low.max_edge)
        };
        let path_low = self.write_tier(Role::Low, &plan.low, &low, folder, token, staged)?;
        drop(low);

        let path_preview =
            self.write_tier(Role::Preview, &plan.preview, &preview, folder, token, staged)?;

        Ok(DerivativeSet {
            folder_id: folder,
            width: Some(width),
            height: Some(height),
            ratio: Some(f64::from(width) / f64::from(height)),
            path_thumb,
            path_low,
            path_preview,
        })
    }

    fn write_tier(
        &self,
        role: Role,
        tier: &TierPlan,
        bitmap: &Bitmap,
        folder: FolderId,
        token: &Token,
        staged: &mut StagedFiles,
    ) -> Result<String, IngestError> {
        let encoded = self.codec.encode(bitmap, tier.format, tier.quality)?;
        let relative = self
            .scheme
            .relative(folder, role, token, tier.format.extension());
        staged.write(self.absolute(&relative)?, &encoded)?;
        tracing::debug!(
            role = ?role,
            path = %relative,
            width = bitmap.width(),
            height = bitmap.height(),
            bytes = encoded.len(),
            "wrote derivative"
        );
        Ok(relative)
    }
}

impl<C: Codec + 'static> DerivativeGenerator<C> {
    /// Run [`ingest`](Self::ingest) on tokio's blocking pool
    pub async fn ingest_async<R>(
        self: Arc<Self>,
        upload: SourceUpload<R>,
    ) -> Result<DerivativeSet, IngestError>
    where
        R: Read + Send + 'static,
    {
        tokio::task::spawn_blocking(move || self.ingest(upload))
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))?
    }
}
