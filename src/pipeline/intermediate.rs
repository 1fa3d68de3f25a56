//! Stage 1: document → intermediate PDF via the office suite.
//!
//! ## Output discovery
//!
//! The office suite names its output after the input stem (`report.docx` →
//! `report.pdf`), but not every build agrees on how to normalise unusual
//! names. So discovery is two-step: the expected name first, then a scan of
//! the workspace root that accepts a single PDF and refuses to pick among
//! several.

use crate::config::{ConversionConfig, INTERMEDIATE_EXTENSION};
use crate::error::{Doc2ImgError, Stage};
use crate::pipeline::process::StageInvocation;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Build the office-suite command converting `input` to PDF in the root.
pub fn invocation(
    config: &ConversionConfig,
    workspace: &Workspace,
    input: &Path,
) -> Result<StageInvocation, Doc2ImgError> {
    Ok(StageInvocation::new(Stage::Intermediate, &config.office_binary)
        .arg(format!("-env:UserInstallation={}", workspace.profile_url()?))
        .arg("--headless")
        .arg("--convert-to")
        .arg(INTERMEDIATE_EXTENSION)
        .arg(input.to_string_lossy())
        .arg("--outdir")
        .arg(workspace.root().to_string_lossy()))
}

/// Locate the PDF produced for `input` inside `root`.
pub fn discover(root: &Path, input: &Path) -> Result<PathBuf, Doc2ImgError> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = root.join(format!("{stem}.{INTERMEDIATE_EXTENSION}"));

    if expected.is_file() {
        debug!("Found intermediate at expected path {}", expected.display());
        return Ok(expected);
    }

    let mut candidates = list_with_extension(root, INTERMEDIATE_EXTENSION)?;
    if candidates.len() == 1 {
        let found = candidates.remove(0);
        info!(
            "Expected {} but found single PDF {}; using it",
            expected.display(),
            found.display()
        );
        return Ok(found);
    }

    Err(Doc2ImgError::AmbiguousOutput {
        expected,
        candidates,
    })
}

/// Regular files directly in `dir` whose extension equals `ext`
/// (ASCII case-insensitive), sorted by file name.
pub(crate) fn list_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Doc2ImgError> {
    let entries = std::fs::read_dir(dir).map_err(|e| Doc2ImgError::Resource {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Doc2ImgError::Resource {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
