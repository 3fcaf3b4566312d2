/// Shared data structures
///
/// These structs flow between the derivative generator, the catalog and
/// whatever serves the gallery JSON.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gallery bucket an image belongs to (always positive)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "i64", into = "i64")]
pub struct FolderId(i64);

impl FolderId {
    pub fn new(id: i64) -> Result<Self, IngestError> {
        if id > 0 {
            Ok(FolderId(id))
        } else {
            Err(IngestError::InvalidFolder(id))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for FolderId {
    type Error = IngestError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        FolderId::new(id)
    }
}

impl From<FolderId> for i64 {
    fn from(folder: FolderId) -> Self {
        folder.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three derivative files of one upload plus the original's geometry.
///
/// Geometry is `None` when the upload was stored without decoding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DerivativeSet {
    pub folder_id: FolderId,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// width / height
    pub ratio: Option<f64>,
    pub path_thumb: String,
    pub path_low: String,
    pub path_preview: String,
}

impl DerivativeSet {
    pub fn paths(&self) -> [&str; 3] {
        [&self.path_thumb, &self.path_low, &self.path_preview]
    }

    /// Paths with duplicates removed, in thumb/low/preview order
    pub fn unique_paths(&self) -> Vec<&str> {
        let mut unique: Vec<&str> = Vec::with_capacity(3);
        for path in self.paths() {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        unique
    }

    /// True when all slots point at one verbatim copy
    pub fn is_passthrough(&self) -> bool {
        self.path_thumb == self.path_low && self.path_low == self.path_preview
    }
}

/// What the gallery inserts after a successful ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    /// Original file name as uploaded
    pub name: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub derivatives: DerivativeSet,
}

/// A catalog row
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Unique database ID
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(rename = "size")]
    pub byte_size: u64,
    /// Unix timestamp
    pub imported_at: i64,
    #[serde(flatten)]
    pub derivatives: DerivativeSet,
}

impl ImageRecord {
    pub fn to_gallery(&self) -> GalleryImage {
        GalleryImage {
            id: self.id,
            path_low: self.derivatives.path_low.clone(),
            path_thumb: self.derivatives.path_thumb.clone(),
            path_preview: self.derivatives.path_preview.clone(),
            width: self.derivatives.width,
            height: self.derivatives.height,
            ratio: self.derivatives.ratio,
        }
    }
}

/// JSON shape consumed by the browser gallery and overlay viewer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub id: i64,
    pub path_low: String,
    pub path_thumb: String,
    pub path_preview: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub ratio: Option<f64>,
}
