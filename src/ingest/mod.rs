/// Derivative generation
///
/// This module handles:
/// - Classifying uploads by MIME type and size (policy.rs)
/// - Decoding, scaling and encoding bitmaps (codec.rs)
/// - Naming derivative files and laying out folders (naming.rs)
/// - Producing the thumbnail / low / preview triple (generator.rs)
/// - Deleting the files of a triple again (cleanup.rs)

pub mod cleanup;
pub mod codec;
pub mod generator;
pub mod naming;
pub mod policy;

pub use cleanup::{CleanupFailure, CleanupFailureKind, CleanupReport, RowRemovalPolicy};
pub use codec::{Bitmap, Codec, ImageCodec};
pub use generator::{DerivativeGenerator, SourceUpload};
pub use naming::{PathScheme, Role, Token};
pub use policy::{IngestPlan, OutputFormat, Policy, SourceFormat, Strategy};
