/// Derivative naming and upload directory layout
///
/// Every derivative lives at `<prefix>/folder_<id>/<role>_<token>.<ext>`,
/// relative to the public directory the gallery is served from. The three
/// files of one upload share one token.

use crate::error::IngestError;
use crate::state::data::FolderId;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Which derivative a file is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Thumb,
    Low,
    Preview,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Thumb, Role::Low, Role::Preview];

    pub fn prefix(self) -> &'static str {
        match self {
            Role::Thumb => "thumb_",
            Role::Low => "low_",
            Role::Preview => "preview_",
        }
    }
}

/// Unique part of a derivative file name (32 hex chars, random v4 UUID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn generate() -> Self {
        Token(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role and token recovered from a derivative path
pub fn parse_file_name(path: &str) -> Option<(Role, &str)> {
    let name = path.rsplit('/').next()?;
    let stem = name.split('.').next()?;
    Role::ALL.into_iter().find_map(|role| {
        stem.strip_prefix(role.prefix())
            .filter(|token| !token.is_empty())
            .map(|token| (role, token))
    })
}

/// Maps folder/role/token to relative paths and back to disk locations
#[derive(Debug, Clone)]
pub struct PathScheme {
    public_dir: PathBuf,
    upload_prefix: String,
}

impl PathScheme {
    pub fn new(public_dir: impl Into<PathBuf>, upload_prefix: impl Into<String>) -> Self {
        Self {
            public_dir: public_dir.into(),
            upload_prefix: upload_prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// `uploads/folder_<id>`
    pub fn folder_dir(&self, folder: FolderId) -> String {
        format!("{}/folder_{}", self.upload_prefix, folder)
    }

    /// `uploads/folder_<id>/<role>_<token>.<ext>`
    pub fn relative(&self, folder: FolderId, role: Role, token: &Token, extension: &str) -> String {
        format!(
            "{}/{}{}.{}",
            self.folder_dir(folder),
            role.prefix(),
            token,
            extension
        )
    }

    /// On-disk location of a relative path.
    ///
    /// `None` for absolute paths or paths that climb out with `..`.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let path = Path::new(relative);
        let mut parts = 0;
        for component in path.components() {
            match component {
                Component::Normal(_) => parts += 1,
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts == 0 {
            return None;
        }
        Some(self.public_dir.join(path))
    }

    /// Create the folder directory if absent.
    ///
    /// Concurrent first uploads to one folder both succeed; an existing
    /// directory counts as success.
    pub fn ensure_folder(&self, folder: FolderId) -> Result<PathBuf, IngestError> {
        let dir = self.public_dir.join(self.folder_dir(folder));
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(dir),
            Err(e) => Err(IngestError::storage(dir, e)),
        }
    }
}
