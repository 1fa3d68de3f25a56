//! Conversion entry points and the pipeline orchestrator.
//!
//! [`ConversionPipeline`] is synchronous: it blocks on each external
//! converter in turn. The async entry points ([`convert_upload`],
//! [`convert_file`], [`convert_to_file`]) move it onto Tokio's blocking pool
//! with `spawn_blocking`, so a slow office-suite run never stalls the
//! executor threads serving other requests.
//!
//! ## State machine
//!
//! ```text
//! Uploaded ──stage1──▶ IntermediateReady ──stage2──▶ PagesRendered ──zip──▶ Packaged
//!     │                        │                           │
//!     └────────────────────────┴───────────────────────────┴──▶ Failed
//! ```
//!
//! Every stage runs at most once. A failure anywhere removes the workspace
//! before the error is returned; a success hands the workspace to a
//! [`DeferredCleanup`] inside the returned [`ConvertedArchive`].

use crate::config::ConversionConfig;
use crate::error::{Doc2ImgError, Stage};
use crate::output::{archive_name, ConversionStats, ConvertedArchive, PackagedResult};
use crate::pipeline::cleanup::CleanupScheduler;
use crate::pipeline::process::{ProcessRunner, StageInvocation, SystemRunner};
use crate::pipeline::{intermediate, package, rasterize};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Position of a job in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Uploaded,
    IntermediateReady,
    PagesRendered,
    Packaged,
    Failed,
}

/// The mutable state of one request as it moves through the pipeline.
#[derive(Debug)]
pub struct ConversionJob {
    /// Name the client uploaded the document under.
    pub original_name: String,
    /// Where the upload was saved inside the workspace.
    pub input_path: PathBuf,
    /// Current pipeline position.
    pub stage: JobStage,
    /// Outputs discovered at the current stage: the intermediate PDF after
    /// stage 1, the ordered page images after stage 2.
    pub outputs: Vec<PathBuf>,
}

impl ConversionJob {
    fn new(original_name: &str, input_path: PathBuf) -> Self {
        Self {
            original_name: original_name.to_string(),
            input_path,
            stage: JobStage::Uploaded,
            outputs: Vec::new(),
        }
    }

    fn advance(&mut self, stage: JobStage, outputs: Vec<PathBuf>) {
        debug!("{}: {:?} → {:?}", self.original_name, self.stage, stage);
        self.stage = stage;
        self.outputs = outputs;
    }
}

/// Drives one upload through both converters and the packager.
pub struct ConversionPipeline<'a> {
    config: &'a ConversionConfig,
    runner: &'a dyn ProcessRunner,
}

impl<'a> ConversionPipeline<'a> {
    pub fn new(config: &'a ConversionConfig, runner: &'a dyn ProcessRunner) -> Self {
        Self { config, runner }
    }

    /// Convert `bytes`, uploaded as `file_name`, into a page-image archive.
    pub fn run(&self, file_name: &str, bytes: &[u8]) -> Result<ConvertedArchive, Doc2ImgError> {
        let total_start = Instant::now();
        info!("Starting conversion: {} ({} bytes)", file_name, bytes.len());

        let workspace = Workspace::create(&self.config.scratch_dir, &self.config.workspace_prefix)?;
        let scheduler = CleanupScheduler::new(workspace);

        match self.drive(scheduler.workspace(), file_name, bytes) {
            Ok((packaged, mut stats)) => {
                stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
                info!(
                    "Conversion complete: {} → {} ({} pages, {}ms)",
                    file_name, packaged.filename, stats.page_count, stats.total_duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_conversion_complete(stats.page_count);
                }
                Ok(ConvertedArchive::new(
                    packaged,
                    stats,
                    scheduler.schedule_cleanup(),
                ))
            }
            Err(e) => {
                warn!("Conversion of {} failed [{}]: {}", file_name, e.kind(), e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_conversion_failed(&e.to_string());
                }
                if let Err(cleanup_err) = scheduler.cleanup_now() {
                    warn!("Cleanup after failure also failed: {}", cleanup_err);
                }
                Err(e)
            }
        }
    }

    /// Every step that can fail, in order. The caller owns cleanup.
    fn drive(
        &self,
        workspace: &Workspace,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(PackagedResult, ConversionStats), Doc2ImgError> {
        let input_path = workspace.save_upload(file_name, bytes)?;
        let mut job = ConversionJob::new(file_name, input_path);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(file_name);
        }

        let result = self.advance_all(workspace, &mut job);
        if result.is_err() {
            job.advance(JobStage::Failed, Vec::new());
        }
        result
    }

    fn advance_all(
        &self,
        workspace: &Workspace,
        job: &mut ConversionJob,
    ) -> Result<(PackagedResult, ConversionStats), Doc2ImgError> {
        let mut stats = ConversionStats::default();
        let root = workspace.root();

        // ── Stage 1: document → PDF ──────────────────────────────────────
        let t = self.stage_started(Stage::Intermediate);
        let inv = intermediate::invocation(self.config, workspace, &job.input_path)?;
        self.run_stage(&inv, root)?;
        let pdf = intermediate::discover(root, &job.input_path)?;
        job.advance(JobStage::IntermediateReady, vec![pdf.clone()]);
        stats.intermediate_duration_ms = self.stage_finished(Stage::Intermediate, t);

        // ── Stage 2: PDF → page images ───────────────────────────────────
        let t = self.stage_started(Stage::Rasterize);
        let inv = rasterize::invocation(self.config, workspace, &pdf);
        self.run_stage(&inv, root)?;
        let pages = rasterize::collect_pages(
            root,
            &self.config.page_prefix,
            self.config.image_format.extension(),
        )?;
        job.advance(JobStage::PagesRendered, pages);
        stats.rasterize_duration_ms = self.stage_finished(Stage::Rasterize, t);

        // ── Package ──────────────────────────────────────────────────────
        let t = Instant::now();
        let archive_path = root.join(archive_name(&job.input_path));
        let packaged = package::package(&job.outputs, &archive_path)?;
        job.advance(JobStage::Packaged, vec![packaged.path.clone()]);
        stats.package_duration_ms = t.elapsed().as_millis() as u64;
        stats.page_count = packaged.page_count();
        stats.archive_bytes = packaged.size_bytes;

        Ok((packaged, stats))
    }

    /// Run one converter; a non-zero exit becomes a stage error.
    fn run_stage(
        &self,
        inv: &StageInvocation,
        working_dir: &Path,
    ) -> Result<(), Doc2ImgError> {
        let outcome = self.runner.run(inv, working_dir)?;
        if !outcome.success() {
            return Err(Doc2ImgError::Conversion {
                stage: inv.stage,
                detail: outcome.failure_detail(),
            });
        }
        Ok(())
    }

    fn stage_started(&self, stage: Stage) -> Instant {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
        Instant::now()
    }

    fn stage_finished(&self, stage: Stage, started: Instant) -> u64 {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!("{} ({}) done in {}ms", stage, stage.describe(), elapsed_ms);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
        elapsed_ms
    }
}

/// Convert an uploaded document with the system converters.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2img::{convert_upload, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("report.docx")?;
/// let archive = convert_upload("report.docx", bytes, &ConversionConfig::default()).await?;
/// std::fs::copy(archive.path(), archive.filename())?;
/// archive.finish()?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_upload(
    file_name: impl Into<String>,
    bytes: impl Into<Vec<u8>>,
    config: &ConversionConfig,
) -> Result<ConvertedArchive, Doc2ImgError> {
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::new(config.stage_timeout()));
    convert_upload_with(file_name, bytes, config, runner).await
}

/// Like [`convert_upload`], with a caller-supplied [`ProcessRunner`].
pub async fn convert_upload_with(
    file_name: impl Into<String>,
    bytes: impl Into<Vec<u8>>,
    config: &ConversionConfig,
    runner: Arc<dyn ProcessRunner>,
) -> Result<ConvertedArchive, Doc2ImgError> {
    let file_name = file_name.into();
    let bytes = bytes.into();
    let config = config.clone();

    tokio::task::spawn_blocking(move || {
        ConversionPipeline::new(&config, runner.as_ref()).run(&file_name, &bytes)
    })
    .await
    .map_err(|e| Doc2ImgError::Internal(format!("Conversion task panicked: {}", e)))?
}

/// Convert a document already on disk.
pub async fn convert_file(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConvertedArchive, Doc2ImgError> {
    let input = input.as_ref();
    let bytes = tokio::fs::read(input)
        .await
        .map_err(|e| Doc2ImgError::UploadIo {
            path: input.to_path_buf(),
            source: e,
        })?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    convert_upload(name, bytes, config).await
}

/// Convert a document and copy the archive to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed copy never leaves a
/// truncated archive behind. The workspace is removed before returning.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Doc2ImgError> {
    let archive = convert_file(input, config).await?;
    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| Doc2ImgError::Resource {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("zip.tmp");
    tokio::fs::copy(archive.path(), &tmp_path)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    let stats = archive.stats.clone();
    archive.finish()?;
    Ok(stats)
}

/// Blocking counterpart of [`convert_upload`].
///
/// Drives a [`ConversionPipeline`] with a [`SystemRunner`] on the calling
/// thread; no runtime is needed.
pub fn convert_sync(
    file_name: &str,
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConvertedArchive, Doc2ImgError> {
    let runner = SystemRunner::new(config.stage_timeout());
    ConversionPipeline::new(config, &runner).run(file_name, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::process::ProcessOutcome;
    use std::sync::Mutex;

    /// Fake converters: stage 1 writes `<stem>.pdf`, stage 2 writes `pages`.
    struct Scripted {
        pages: Vec<&'static str>,
        calls: Mutex<Vec<Stage>>,
    }

    impl ProcessRunner for Scripted {
        fn run(&self, inv: &StageInvocation, dir: &Path) -> Result<ProcessOutcome, Doc2ImgError> {
            self.calls.lock().unwrap().push(inv.stage);
            match inv.stage {
                Stage::Intermediate => {
                    let input = Path::new(&inv.args[4]);
                    let stem = input.file_stem().unwrap().to_string_lossy();
                    std::fs::write(dir.join(format!("{stem}.pdf")), b"%PDF").unwrap();
                }
                Stage::Rasterize => {
                    for p in &self.pages {
                        std::fs::write(dir.join(p), b"png").unwrap();
                    }
                }
            }
            Ok(ProcessOutcome {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    fn config(base: &Path) -> ConversionConfig {
        ConversionConfig::builder().scratch_dir(base).build().unwrap()
    }

    #[test]
    fn stages_run_in_order_once_each() {
        let base = tempfile::tempdir().unwrap();
        let runner = Scripted {
            pages: vec!["page-1.png"],
            calls: Mutex::new(Vec::new()),
        };
        let cfg = config(base.path());
        let archive = ConversionPipeline::new(&cfg, &runner)
            .run("memo.odt", b"doc")
            .unwrap();

        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec![Stage::Intermediate, Stage::Rasterize]
        );
        assert_eq!(archive.filename(), "memo_images.zip");
        assert_eq!(archive.stats.page_count, 1);
        archive.finish().unwrap();
    }

    #[test]
    fn no_pages_stops_before_packaging() {
        let base = tempfile::tempdir().unwrap();
        let runner = Scripted {
            pages: vec![],
            calls: Mutex::new(Vec::new()),
        };
        let cfg = config(base.path());
        let err = ConversionPipeline::new(&cfg, &runner)
            .run("memo.odt", b"doc")
            .unwrap_err();
        assert!(matches!(err, Doc2ImgError::NoOutput { .. }));
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn convert_upload_with_runs_on_blocking_pool() {
        let base = tempfile::tempdir().unwrap();
        let runner = Arc::new(Scripted {
            pages: vec!["page-1.png", "page-2.png"],
            calls: Mutex::new(Vec::new()),
        });
        let archive = convert_upload_with("a.docx", b"x".to_vec(), &config(base.path()), runner)
            .await
            .unwrap();
        assert_eq!(archive.packaged.entries, ["page-1.png", "page-2.png"]);
        let root = archive.workspace_root().to_path_buf();
        drop(archive);
        assert!(!root.exists());
    }
}
