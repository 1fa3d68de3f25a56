//! Result packaging: ordered page images → one zip archive.
//!
//! Entries are written flat (base name only) in exactly the order given, and
//! stored rather than deflated: PNG and JPEG data is already compressed, so
//! deflating would cost CPU for no size gain.

use crate::error::Doc2ImgError;
use crate::output::PackagedResult;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write `ordered_files` into a new archive at `archive_path`.
///
/// An existing file at `archive_path` is replaced, never appended to.
pub fn package(ordered_files: &[PathBuf], archive_path: &Path) -> Result<PackagedResult, Doc2ImgError> {
    let packaging = |source: ZipError| Doc2ImgError::Packaging {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::create(archive_path).map_err(|e| packaging(e.into()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    let mut entries = Vec::with_capacity(ordered_files.len());
    for path in ordered_files {
        let name = entry_name(path)?;
        zip.start_file(name.clone(), options).map_err(packaging)?;
        let mut src = File::open(path).map_err(|e| packaging(e.into()))?;
        io::copy(&mut src, &mut zip).map_err(|e| packaging(e.into()))?;
        debug!("Packed {}", name);
        entries.push(name);
    }

    let mut writer = zip.finish().map_err(packaging)?;
    writer.flush().map_err(|e| packaging(e.into()))?;
    drop(writer);

    let size_bytes = std::fs::metadata(archive_path)
        .map_err(|e| packaging(e.into()))?
        .len();

    let filename = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(
        "Packaged {} page(s) into {} ({} bytes)",
        entries.len(),
        filename,
        size_bytes
    );

    Ok(PackagedResult {
        path: archive_path.to_path_buf(),
        filename,
        entries,
        size_bytes,
    })
}

fn entry_name(path: &Path) -> Result<String, Doc2ImgError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Doc2ImgError::Internal(format!("Not a file path: {}", path.display())))
}
