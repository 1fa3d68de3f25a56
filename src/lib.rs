//! # edgequake-doc2img
//!
//! Convert office documents (DOCX, ODT, RTF, …) into a zip archive holding
//! one image per page.
//!
//! ## Why two converters?
//!
//! No single tool both understands office formats and rasterises pages well.
//! LibreOffice lays the document out faithfully and prints it to PDF;
//! pdftoppm then turns each PDF page into a PNG. This crate is the
//! orchestrator between them: it isolates each request in its own workspace,
//! runs the two converters in order, validates what they wrote, zips the
//! pages and always cleans up.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Workspace  create <tmp>/doc2img_<uuid>/ with a private LibreOffice profile
//!  ├─ 2. Stage 1    libreoffice --headless --convert-to pdf   (blocking)
//!  ├─ 3. Discover   <stem>.pdf, or the single PDF present, else fail
//!  ├─ 4. Stage 2    pdftoppm <pdf> page -png                  (blocking)
//!  ├─ 5. Collect    page*.png sorted by name; none → fail
//!  ├─ 6. Package    <stem>_images.zip
//!  └─ 7. Cleanup    immediately on failure, after delivery on success
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2img::{convert_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let archive = convert_file("report.docx", &ConversionConfig::default()).await?;
//!     println!("{} pages → {}", archive.stats.page_count, archive.filename());
//!     std::fs::copy(archive.path(), archive.filename())?;
//!     archive.finish()?; // removes the workspace
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `doc2img` binary (clap + anyhow + tracing-subscriber) |
//! | `server` | on      | Enables [`server`], the axum HTTP service behind `doc2img serve` |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-doc2img = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageFormat};
pub use convert::{
    convert_file, convert_sync, convert_to_file, convert_upload, convert_upload_with,
    ConversionJob, ConversionPipeline, JobStage,
};
pub use error::{Doc2ImgError, Stage};
pub use output::{ConversionStats, ConvertedArchive, PackagedResult};
pub use pipeline::cleanup::{CleanupScheduler, DeferredCleanup};
pub use pipeline::process::{ProcessOutcome, ProcessRunner, StageInvocation, SystemRunner};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use workspace::Workspace;
