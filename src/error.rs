//! Error types for the edgequake-doc2img library.
//!
//! A single fatal error type, [`Doc2ImgError`], covers every way a conversion
//! can fail. There is no partial-success mode: a document either becomes a
//! complete archive or the request fails and its workspace is removed.
//!
//! Variants are grouped by the pipeline step that raises them so that a
//! caller matching on the error can tell *where* the request died without
//! parsing the message.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One external-process step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    /// Document → intermediate PDF (office suite).
    Intermediate,
    /// Intermediate PDF → page images (rasteriser).
    Rasterize,
}

impl Stage {
    /// Stable short name used in error messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intermediate => "stage1",
            Stage::Rasterize => "stage2",
        }
    }

    /// Human-readable description of what the stage does.
    pub fn describe(&self) -> &'static str {
        match self {
            Stage::Intermediate => "document to PDF",
            Stage::Rasterize => "PDF to page images",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the edgequake-doc2img library.
#[derive(Debug, Error)]
pub enum Doc2ImgError {
    // ── Workspace errors ──────────────────────────────────────────────────
    /// The scratch workspace could not be allocated or removed.
    #[error("Workspace error at '{path}': {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The uploaded document could not be saved into the workspace.
    #[error("Failed to save upload to '{path}': {source}")]
    UploadIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Converter errors ──────────────────────────────────────────────────
    /// An external converter exited with a non-zero status.
    #[error("Conversion failed at {stage} ({}): {detail}", .stage.describe())]
    Conversion { stage: Stage, detail: String },

    /// The converter binary could not be started at all.
    #[error("Could not launch '{program}' for {stage}: {source}\nIs it installed and on PATH?")]
    LaunchFailed {
        stage: Stage,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The converter was still running when the stage timeout expired.
    #[error("{stage} did not finish within {secs}s and was killed")]
    StageTimeout { stage: Stage, secs: u64 },

    // ── Output validation errors ──────────────────────────────────────────
    /// Stage 1 produced zero or several PDF candidates and none matched the
    /// expected name.
    #[error(
        "PDF file was not created or is ambiguous: expected '{}', found {} candidate(s)",
        .expected.display(),
        .candidates.len()
    )]
    AmbiguousOutput {
        expected: PathBuf,
        candidates: Vec<PathBuf>,
    },

    /// Stage 2 exited cleanly but no page images were found.
    #[error("No page images were generated in '{dir}'")]
    NoOutput { dir: PathBuf },

    // ── Packaging errors ──────────────────────────────────────────────────
    /// The result archive could not be written.
    #[error("Failed to write archive '{path}': {source}")]
    Packaging {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2ImgError {
    /// Stable, machine-friendly tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Doc2ImgError::Resource { .. } => "resource",
            Doc2ImgError::UploadIo { .. } => "upload_io",
            Doc2ImgError::Conversion { .. } => "conversion",
            Doc2ImgError::LaunchFailed { .. } => "launch_failed",
            Doc2ImgError::StageTimeout { .. } => "stage_timeout",
            Doc2ImgError::AmbiguousOutput { .. } => "ambiguous_output",
            Doc2ImgError::NoOutput { .. } => "no_output",
            Doc2ImgError::Packaging { .. } => "packaging",
            Doc2ImgError::InvalidConfig(_) => "invalid_config",
            Doc2ImgError::Internal(_) => "internal",
        }
    }

    /// The stage the error originated in, when it came from a converter.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Doc2ImgError::Conversion { stage, .. }
            | Doc2ImgError::LaunchFailed { stage, .. }
            | Doc2ImgError::StageTimeout { stage, .. } => Some(*stage),
            Doc2ImgError::AmbiguousOutput { .. } => Some(Stage::Intermediate),
            Doc2ImgError::NoOutput { .. } => Some(Stage::Rasterize),
            _ => None,
        }
    }
}
