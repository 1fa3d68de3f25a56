//! Result types returned by a conversion.

use crate::error::Doc2ImgError;
use crate::pipeline::cleanup::DeferredCleanup;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The archive produced by the packager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagedResult {
    /// Location of the archive inside the workspace.
    pub path: PathBuf,
    /// Public file name, `<stem>_images.zip`.
    pub filename: String,
    /// Entry names in archive (= page) order.
    pub entries: Vec<String>,
    /// Archive size on disk.
    pub size_bytes: u64,
}

impl PackagedResult {
    pub fn page_count(&self) -> usize {
        self.entries.len()
    }
}

/// Timing and size figures for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Number of page images in the archive.
    pub page_count: usize,
    /// Wall-clock time of stage 1 (office suite), including discovery.
    pub intermediate_duration_ms: u64,
    /// Wall-clock time of stage 2 (rasteriser), including collection.
    pub rasterize_duration_ms: u64,
    /// Time spent writing the archive.
    pub package_duration_ms: u64,
    /// End-to-end time, workspace creation to archive.
    pub total_duration_ms: u64,
    /// Archive size on disk.
    pub archive_bytes: u64,
}

/// A finished conversion whose workspace is still alive.
///
/// The archive lives inside the request workspace; the workspace is removed
/// when [`ConvertedArchive::finish`] is called or the value is dropped, so
/// read or stream the archive before letting go of it.
#[derive(Debug)]
pub struct ConvertedArchive {
    pub packaged: PackagedResult,
    pub stats: ConversionStats,
    cleanup: DeferredCleanup,
}

impl ConvertedArchive {
    pub(crate) fn new(packaged: PackagedResult, stats: ConversionStats, cleanup: DeferredCleanup) -> Self {
        Self {
            packaged,
            stats,
            cleanup,
        }
    }

    /// Path of the archive on disk.
    pub fn path(&self) -> &Path {
        &self.packaged.path
    }

    /// File name to present to the caller.
    pub fn filename(&self) -> &str {
        &self.packaged.filename
    }

    /// Root directory of the owning workspace.
    pub fn workspace_root(&self) -> &Path {
        self.cleanup.workspace().root()
    }

    /// Read the whole archive into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>, Doc2ImgError> {
        std::fs::read(&self.packaged.path).map_err(|e| Doc2ImgError::Resource {
            path: self.packaged.path.clone(),
            source: e,
        })
    }

    /// Split into the result metadata and the cleanup hook, e.g. to keep the
    /// hook alive inside a streaming response body.
    pub fn into_parts(self) -> (PackagedResult, ConversionStats, DeferredCleanup) {
        (self.packaged, self.stats, self.cleanup)
    }

    /// Delivery is done: remove the workspace now.
    pub fn finish(self) -> Result<(), Doc2ImgError> {
        self.cleanup.complete()
    }
}

/// Public archive name for an upload: `<stem>_images.zip`.
pub fn archive_name(upload_path: &Path) -> String {
    let stem = upload_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_images.zip")
}
