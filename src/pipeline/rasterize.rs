//! Stage 2: intermediate PDF → one image per page via the rasteriser.
//!
//! ## Page order
//!
//! Pages are ordered by sorting file names lexicographically. That is only
//! correct because pdftoppm zero-pads the page number to the width of the
//! last page (`page-01.png` … `page-12.png`). The assumption is not enforced;
//! [`collect_pages`] logs a warning when the numeric suffixes it sees have
//! mixed widths so a rasteriser that stops padding is noticed.

use crate::config::ConversionConfig;
use crate::error::{Doc2ImgError, Stage};
use crate::pipeline::process::StageInvocation;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Build the rasteriser command for `pdf`, writing pages into the root.
pub fn invocation(config: &ConversionConfig, workspace: &Workspace, pdf: &Path) -> StageInvocation {
    let mut inv = StageInvocation::new(Stage::Rasterize, &config.rasterizer_binary)
        .arg(pdf.to_string_lossy())
        .arg(workspace.root().join(&config.page_prefix).to_string_lossy())
        .arg(config.image_format.flag());
    if let Some(dpi) = config.dpi {
        inv = inv.arg("-r").arg(dpi.to_string());
    }
    inv
}

/// Gather the page images in `root`, sorted into page order.
///
/// A page is a regular file whose name starts with `prefix` and whose
/// extension is `ext`. An empty result is [`Doc2ImgError::NoOutput`]: a clean
/// exit status alone does not prove pages were written.
pub fn collect_pages(root: &Path, prefix: &str, ext: &str) -> Result<Vec<PathBuf>, Doc2ImgError> {
    let pages: Vec<PathBuf> = super::intermediate::list_with_extension(root, ext)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(prefix))
        })
        .collect();

    if pages.is_empty() {
        return Err(Doc2ImgError::NoOutput {
            dir: root.to_path_buf(),
        });
    }

    let pages = sort_pages(pages);
    if !suffix_widths_uniform(&pages) {
        warn!(
            "Page file names in {} have unpadded numbers; lexicographic order may not be page order",
            root.display()
        );
    }
    debug!("Collected {} page image(s)", pages.len());
    Ok(pages)
}

/// Ascending lexicographic order by file name.
pub fn sort_pages(mut pages: Vec<PathBuf>) -> Vec<PathBuf> {
    pages.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    pages
}

/// Whether every page's trailing digit run has the same length.
fn suffix_widths_uniform(pages: &[PathBuf]) -> bool {
    let mut widths = pages.iter().filter_map(|p| {
        let stem = p.file_stem()?.to_string_lossy().into_owned();
        let digits = stem.chars().rev().take_while(|c| c.is_ascii_digit()).count();
        (digits > 0).then_some(digits)
    });
    match widths.next() {
        Some(first) => widths.all(|w| w == first),
        None => true,
    }
}
