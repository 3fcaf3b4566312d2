/// Derivative cleanup
///
/// Removes the files behind a derivative set and reports every path
/// individually. A missing file is an entry in the report, not an error.

use crate::error::IngestError;
use crate::ingest::naming::{parse_file_name, PathScheme};
use crate::state::data::DerivativeSet;
use serde::{Deserialize, Serialize};
use std::io;

/// When a cleanup report allows the catalog row to go
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowRemovalPolicy {
    /// Every recorded file existed and was deleted
    AllPresent,
    /// At least one file was deleted
    #[default]
    AnyDeleted,
    /// Regardless of what was on disk
    Always,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CleanupFailureKind {
    /// Nothing at that path
    Missing,
    /// Path is absolute or leaves the public directory
    OutsideRoot,
    /// File exists but could not be removed
    Io { message: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub path: String,
    #[serde(flatten)]
    pub kind: CleanupFailureKind,
}

/// Per-path outcome of [`remove_derivatives`]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted_paths: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn missing(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.kind == CleanupFailureKind::Missing)
            .count()
    }

    pub fn permits_row_removal(&self, policy: RowRemovalPolicy) -> bool {
        match policy {
            RowRemovalPolicy::AllPresent => self.is_complete() && !self.deleted_paths.is_empty(),
            RowRemovalPolicy::AnyDeleted => !self.deleted_paths.is_empty(),
            RowRemovalPolicy::Always => true,
        }
    }

    /// Turn an incomplete report into `CleanupPartial`
    pub fn ensure_complete(self) -> Result<Self, IngestError> {
        if self.is_complete() {
            return Ok(self);
        }
        let missing = self.missing();
        Err(IngestError::CleanupPartial {
            deleted: self.deleted_paths.len(),
            missing,
            failed: self.failures.len() - missing,
        })
    }
}

/// Delete each distinct path of `set` under the scheme's public directory
#[tracing::instrument(
    skip(scheme, set),
    fields(folder = %set.folder_id, thumb = %set.path_thumb, passthrough = set.is_passthrough())
)]
pub fn remove_derivatives(scheme: &PathScheme, set: &DerivativeSet) -> CleanupReport {
    let mut report = CleanupReport::default();

    for relative in set.unique_paths() {
        let failure = |kind| CleanupFailure {
            path: relative.to_string(),
            kind,
        };

        let Some(path) = scheme.resolve(relative) else {
            tracing::warn!(path = relative, "refusing to delete path outside public directory");
            report.failures.push(failure(CleanupFailureKind::OutsideRoot));
            continue;
        };

        match std::fs::remove_file(&path) {
            Ok(()) => {
                let role = parse_file_name(relative).map(|(role, _)| role);
                tracing::debug!(path = relative, role = ?role, "deleted derivative");
                report.deleted_paths.push(relative.to_string());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = relative, "derivative already gone");
                report.failures.push(failure(CleanupFailureKind::Missing));
            }
            Err(e) => {
                tracing::warn!(path = relative, error = %e, "could not delete derivative");
                report.failures.push(failure(CleanupFailureKind::Io {
                    message: e.to_string(),
                }));
            }
        }
    }

    tracing::info!(
        deleted = report.deleted_paths.len(),
        failures = report.failures.len(),
        "cleaned up derivatives"
    );
    report
}
