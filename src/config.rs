/// Gallery configuration
///
/// Loaded from a TOML file; every key has a default so an empty file (or no
/// file at all) gives the stock gallery behavior.

use crate::error::ConfigError;
use crate::ingest::cleanup::RowRemovalPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Size and quality of one derivative tier
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierConfig {
    /// Longest edge in pixels; smaller bitmaps are never upscaled
    pub max_edge: u32,
    /// 0-100, 0 = smallest file
    pub quality: u8,
}

/// Knobs of the derivative generator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// First path component of every derivative (`uploads/folder_<id>/...`)
    pub upload_prefix: String,
    /// At or below this many bytes, GIF/SVG pass through and previews keep their format
    pub soft_threshold_bytes: u64,
    /// Above this many bytes any upload is rejected before decoding
    pub hard_ceiling_bytes: u64,
    pub thumbnail: TierConfig,
    pub low: TierConfig,
    pub preview: TierConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_prefix: "uploads".to_string(),
            soft_threshold_bytes: 1000 * 1024,
            hard_ceiling_bytes: 50 * 1000 * 1024,
            thumbnail: TierConfig {
                max_edge: 500,
                quality: 85,
            },
            low: TierConfig {
                max_edge: 1920,
                quality: 0,
            },
            preview: TierConfig {
                max_edge: 1920,
                quality: 85,
            },
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_prefix.is_empty() {
            return Err(ConfigError::Invalid("upload_prefix must not be empty".into()));
        }
        if self.soft_threshold_bytes >= self.hard_ceiling_bytes {
            return Err(ConfigError::Invalid(format!(
                "soft threshold ({}) must be below hard ceiling ({})",
                self.soft_threshold_bytes, self.hard_ceiling_bytes
            )));
        }
        for (name, tier) in [
            ("thumbnail", self.thumbnail),
            ("low", self.low),
            ("preview", self.preview),
        ] {
            if tier.max_edge == 0 {
                return Err(ConfigError::Invalid(format!("{name}.max_edge must be positive")));
            }
            if tier.quality > 100 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.quality must be 0-100, got {}",
                    tier.quality
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration for the gallery binary
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GalleryConfig {
    /// Directory the relative derivative paths are served from
    pub public_dir: PathBuf,
    /// SQLite catalog; `None` means the per-user data directory
    pub database: Option<PathBuf>,
    /// Whether a partially cleaned record may lose its row
    pub row_removal: RowRemovalPolicy,
    pub ingest: IngestConfig,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            database: None,
            row_removal: RowRemovalPolicy::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl GalleryConfig {
    /// Read and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: GalleryConfig = toml::from_str(text)?;
        config.ingest.validate()?;
        Ok(config)
    }

    /// Where the catalog lives
    ///
    /// - Linux: ~/.local/share/gallery-ingest/gallery.db
    /// - macOS: ~/Library/Application Support/gallery-ingest/gallery.db
    /// - Windows: %APPDATA%\gallery-ingest\gallery.db
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database {
            return path.clone();
        }
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("gallery-ingest");
        path.push("gallery.db");
        path
    }
}
