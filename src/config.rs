//! Configuration types for document-to-images conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. A config holds no per-request state and
//! is shared by every concurrent conversion.

use crate::error::Doc2ImgError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the office-suite profile directory inside each workspace.
pub const PROFILE_DIR_NAME: &str = "lo_profile";

/// Name of the directory holding the saved upload inside each workspace.
pub const INPUT_DIR_NAME: &str = "input";

/// Extension of the intermediate fixed-layout format produced by stage 1.
pub const INTERMEDIATE_EXTENSION: &str = "pdf";

/// Configuration for a document-to-images conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2img::{ConversionConfig, ImageFormat};
///
/// let config = ConversionConfig::builder()
///     .image_format(ImageFormat::Jpeg)
///     .dpi(200)
///     .stage_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, Some(200));
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Office-suite executable used for stage 1. Default: `libreoffice`.
    pub office_binary: String,

    /// PDF rasteriser executable used for stage 2. Default: `pdftoppm`.
    pub rasterizer_binary: String,

    /// Directory under which per-request workspaces are created.
    /// Default: the system temp directory.
    pub scratch_dir: PathBuf,

    /// Prefix of every workspace directory name. Default: `doc2img_`.
    pub workspace_prefix: String,

    /// File-name prefix handed to the rasteriser; it appends `-N.<ext>`.
    /// Default: `page`.
    pub page_prefix: String,

    /// Output image format. Default: [`ImageFormat::Png`].
    pub image_format: ImageFormat,

    /// Rasterisation resolution. `None` leaves the rasteriser default
    /// (150 DPI for pdftoppm). Range: 36–600.
    pub dpi: Option<u32>,

    /// Wall-clock limit for each external stage in seconds. `None` waits
    /// forever. Default: 300.
    pub stage_timeout_secs: Option<u64>,

    /// Optional observer for stage-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            office_binary: "libreoffice".to_string(),
            rasterizer_binary: "pdftoppm".to_string(),
            scratch_dir: std::env::temp_dir(),
            workspace_prefix: "doc2img_".to_string(),
            page_prefix: "page".to_string(),
            image_format: ImageFormat::default(),
            dpi: None,
            stage_timeout_secs: Some(300),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("office_binary", &self.office_binary)
            .field("rasterizer_binary", &self.rasterizer_binary)
            .field("scratch_dir", &self.scratch_dir)
            .field("workspace_prefix", &self.workspace_prefix)
            .field("page_prefix", &self.page_prefix)
            .field("image_format", &self.image_format)
            .field("dpi", &self.dpi)
            .field("stage_timeout_secs", &self.stage_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The stage timeout as a [`Duration`], if any.
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn office_binary(mut self, program: impl Into<String>) -> Self {
        self.config.office_binary = program.into();
        self
    }

    pub fn rasterizer_binary(mut self, program: impl Into<String>) -> Self {
        self.config.rasterizer_binary = program.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn workspace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.workspace_prefix = prefix.into();
        self
    }

    pub fn page_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.page_prefix = prefix.into();
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = Some(dpi.clamp(36, 600));
        self
    }

    pub fn stage_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stage_timeout_secs = Some(secs.max(1));
        self
    }

    /// Disable the per-stage timeout entirely.
    pub fn no_stage_timeout(mut self) -> Self {
        self.config.stage_timeout_secs = None;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2ImgError> {
        let c = &self.config;
        if c.office_binary.trim().is_empty() || c.rasterizer_binary.trim().is_empty() {
            return Err(Doc2ImgError::InvalidConfig(
                "Converter binaries must not be empty".into(),
            ));
        }
        if !is_plain_name(&c.page_prefix) {
            return Err(Doc2ImgError::InvalidConfig(format!(
                "Page prefix must be a plain file name, got '{}'",
                c.page_prefix
            )));
        }
        if !c.workspace_prefix.is_empty() && !is_plain_name(&c.workspace_prefix) {
            return Err(Doc2ImgError::InvalidConfig(format!(
                "Workspace prefix must be a plain file name, got '{}'",
                c.workspace_prefix
            )));
        }
        if let Some(dpi) = c.dpi {
            if !(36..=600).contains(&dpi) {
                return Err(Doc2ImgError::InvalidConfig(format!(
                    "DPI must be 36–600, got {}",
                    dpi
                )));
            }
        }
        Ok(self.config)
    }
}

/// A non-empty name without separators or dot-segments.
fn is_plain_name(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains(['/', '\\'])
        && !s.chars().any(char::is_control)
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Page image format requested from the rasteriser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless PNG (default).
    #[default]
    Png,
    /// JPEG; smaller archives for scanned or photographic pages.
    Jpeg,
    /// TIFF, for archival workflows.
    Tiff,
}

impl ImageFormat {
    /// Rasteriser flag selecting this format.
    pub fn flag(&self) -> &'static str {
        match self {
            ImageFormat::Png => "-png",
            ImageFormat::Jpeg => "-jpeg",
            ImageFormat::Tiff => "-tiff",
        }
    }

    /// File extension the rasteriser writes for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Tiff => "tif",
        }
    }
}
