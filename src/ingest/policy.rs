/// Format classification and ingestion policy
///
/// Decides from the declared MIME type and byte size which strategy an upload
/// gets and what each derivative tier is encoded as. Supported formats are
/// one table; adding a format is a table edit.

use crate::config::{IngestConfig, TierConfig};
use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Input formats the gallery accepts
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Bmp,
    Gif,
    Svg,
}

/// Formats derivatives can be written as
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
    Gif,
    Bmp,
    Avif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Avif => "avif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(format_spec(*self).extension)
    }
}

/// What happens to an upload at or below the soft threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallPolicy {
    Reencode,
    Passthrough,
}

/// What happens to an upload above the soft threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LargePolicy {
    Reencode,
    Reject,
}

/// One row of the format table
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
    pub format: SourceFormat,
    pub mime: &'static str,
    /// Extension used when bytes are kept as-is
    pub extension: &'static str,
    /// Decodable into a bitmap
    pub decodable: bool,
    /// Encoder used for a full preview that keeps the source format
    pub native_output: Option<OutputFormat>,
    pub small: SmallPolicy,
    pub large: LargePolicy,
}

const FORMATS: &[FormatSpec] = &[
    FormatSpec {
        format: SourceFormat::Jpeg,
        mime: "image/jpeg",
        extension: "jpg",
        decodable: true,
        native_output: Some(OutputFormat::Jpeg),
        small: SmallPolicy::Reencode,
        large: LargePolicy::Reencode,
    },
    FormatSpec {
        format: SourceFormat::Png,
        mime: "image/png",
        extension: "png",
        decodable: true,
        native_output: Some(OutputFormat::Png),
        small: SmallPolicy::Reencode,
        large: LargePolicy::Reencode,
    },
    FormatSpec {
        format: SourceFormat::Webp,
        mime: "image/webp",
        extension: "webp",
        decodable: true,
        native_output: Some(OutputFormat::Webp),
        small: SmallPolicy::Reencode,
        large: LargePolicy::Reencode,
    },
    FormatSpec {
        format: SourceFormat::Avif,
        mime: "image/avif",
        extension: "avif",
        // decoding goes through dav1d
        decodable: cfg!(feature = "avif-native"),
        native_output: Some(OutputFormat::Avif),
        small: SmallPolicy::Reencode,
        large: LargePolicy::Reencode,
    },
    FormatSpec {
        format: SourceFormat::Bmp,
        mime: "image/bmp",
        extension: "bmp",
        decodable: true,
        native_output: Some(OutputFormat::Bmp),
        small: SmallPolicy::Reencode,
        large: LargePolicy::Reencode,
    },
    FormatSpec {
        format: SourceFormat::Gif,
        mime: "image/gif",
        extension: "gif",
        decodable: true,
        native_output: Some(OutputFormat::Gif),
        small: SmallPolicy::Passthrough,
        large: LargePolicy::Reencode,
    },
    // SVG cannot be raster-rescaled, so only small files are kept as-is
    FormatSpec {
        format: SourceFormat::Svg,
        mime: "image/svg+xml",
        extension: "svg",
        decodable: false,
        native_output: None,
        small: SmallPolicy::Passthrough,
        large: LargePolicy::Reject,
    },
];

/// Look up a MIME type; case-insensitive, parameters ignored
pub fn lookup_mime(mime: &str) -> Option<&'static FormatSpec> {
    let essence = mime.split(';').next().unwrap_or("").trim();
    FORMATS
        .iter()
        .find(|spec| spec.mime.eq_ignore_ascii_case(essence))
}

pub fn format_spec(format: SourceFormat) -> &'static FormatSpec {
    FORMATS
        .iter()
        .find(|spec| spec.format == format)
        .unwrap_or(&FORMATS[0])
}

/// Guess a MIME type from a file extension (for callers without one)
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    let format = match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => SourceFormat::Jpeg,
        "png" => SourceFormat::Png,
        "webp" => SourceFormat::Webp,
        "avif" => SourceFormat::Avif,
        "bmp" => SourceFormat::Bmp,
        "gif" => SourceFormat::Gif,
        "svg" => SourceFormat::Svg,
        _ => return None,
    };
    Some(format_spec(format).mime)
}

/// How the bytes of one upload become derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Copy source bytes into one file shared by all three slots
    Passthrough,
    /// Decode, scale per tier, re-encode
    Reencode,
}

/// Target of one derivative tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPlan {
    pub max_edge: u32,
    pub format: OutputFormat,
    pub quality: u8,
}

/// Outcome of [`Policy::classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestPlan {
    pub format: SourceFormat,
    pub strategy: Strategy,
    /// Above the soft threshold
    pub oversized: bool,
    pub thumbnail: TierPlan,
    pub low: TierPlan,
    pub preview: TierPlan,
}

impl IngestPlan {
    pub fn spec(&self) -> &'static FormatSpec {
        format_spec(self.format)
    }
}

/// Size thresholds and tier settings, evaluated per upload
#[derive(Debug, Clone)]
pub struct Policy {
    soft_threshold: u64,
    hard_ceiling: u64,
    thumbnail: TierConfig,
    low: TierConfig,
    preview: TierConfig,
}

impl Policy {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            soft_threshold: config.soft_threshold_bytes,
            hard_ceiling: config.hard_ceiling_bytes,
            thumbnail: config.thumbnail,
            low: config.low,
            preview: config.preview,
        }
    }

    pub fn hard_ceiling(&self) -> u64 {
        self.hard_ceiling
    }

    /// Check a byte count against the hard ceiling
    pub fn check_hard_ceiling(&self, size: u64) -> Result<(), IngestError> {
        if size > self.hard_ceiling {
            return Err(IngestError::HardSizeLimit {
                size,
                limit: self.hard_ceiling,
            });
        }
        Ok(())
    }

    /// Decide strategy and tier targets for an upload.
    ///
    /// The hard ceiling is checked first, before the type is even looked at.
    pub fn classify(&self, mime: &str, byte_size: u64) -> Result<IngestPlan, IngestError> {
        self.check_hard_ceiling(byte_size)?;

        let spec = lookup_mime(mime).ok_or_else(|| IngestError::UnsupportedFormat {
            mime: mime.to_string(),
        })?;

        let oversized = byte_size > self.soft_threshold;
        let strategy = match (oversized, spec.small, spec.large) {
            (false, SmallPolicy::Passthrough, _) => Strategy::Passthrough,
            (false, SmallPolicy::Reencode, _) => Strategy::Reencode,
            (true, _, LargePolicy::Reencode) => Strategy::Reencode,
            (true, _, LargePolicy::Reject) => {
                return Err(IngestError::UnsupportedSize {
                    mime: spec.mime.to_string(),
                    size: byte_size,
                    limit: self.soft_threshold,
                })
            }
        };

        if strategy == Strategy::Reencode && !spec.decodable {
            return Err(IngestError::UnsupportedFormat {
                mime: spec.mime.to_string(),
            });
        }

        Ok(IngestPlan {
            format: spec.format,
            strategy,
            oversized,
            thumbnail: tier(self.thumbnail, OutputFormat::Webp),
            low: tier(self.low, OutputFormat::Webp),
            preview: tier(self.preview, preview_format(spec, oversized)),
        })
    }
}

fn tier(config: TierConfig, format: OutputFormat) -> TierPlan {
    TierPlan {
        max_edge: config.max_edge,
        format,
        quality: config.quality,
    }
}

/// Output format of the full preview.
///
/// Oversized uploads are always converted to WebP; smaller ones keep their
/// own format when there is an encoder for it.
pub fn preview_format(spec: &FormatSpec, oversized: bool) -> OutputFormat {
    if oversized {
        return OutputFormat::Webp;
    }
    spec.native_output.unwrap_or(OutputFormat::Webp)
}
