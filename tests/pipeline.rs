//! Pipeline behaviour against scripted converters.
//!
//! `FakeConverters` stands in for libreoffice and pdftoppm: it writes
//! whatever files a test asks for into the workspace and exits with the
//! requested status, so every success and failure path can be driven
//! without the real tools installed.

use edgequake_doc2img::{
    convert_sync, convert_upload_with, ConversionConfig, ConversionPipeline, ConversionProgressCallback,
    Doc2ImgError, ProcessOutcome, ProcessRunner, Stage, StageInvocation, SystemRunner,
};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// A runner-level error a fake stage raises instead of exiting.
#[derive(Clone, Copy)]
enum Fault {
    Launch,
    Timeout,
}

/// What one fake stage does when invoked.
#[derive(Clone, Default)]
struct StageScript {
    writes: Vec<String>,
    dirs: Vec<String>,
    exit_code: i32,
    stderr: String,
    fault: Option<Fault>,
}

impl StageScript {
    fn writes(files: &[&str]) -> Self {
        Self {
            writes: files.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    fn raises(fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..Default::default()
        }
    }

    fn fails(code: i32, stderr: &str) -> Self {
        Self {
            exit_code: code,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct FakeConverters {
    intermediate: StageScript,
    rasterize: StageScript,
    calls: Mutex<Vec<Stage>>,
    roots: Mutex<Vec<PathBuf>>,
}

impl FakeConverters {
    fn new(intermediate: StageScript, rasterize: StageScript) -> Self {
        Self {
            intermediate,
            rasterize,
            ..Default::default()
        }
    }

    /// `report.docx` → `report.pdf` → three pages.
    fn report() -> Self {
        Self::new(
            StageScript::writes(&["report.pdf"]),
            StageScript::writes(&["page-1.png", "page-2.png", "page-3.png"]),
        )
    }

    fn calls(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for FakeConverters {
    fn run(&self, inv: &StageInvocation, dir: &Path) -> Result<ProcessOutcome, Doc2ImgError> {
        self.calls.lock().unwrap().push(inv.stage);
        self.roots.lock().unwrap().push(dir.to_path_buf());
        let script = match inv.stage {
            Stage::Intermediate => &self.intermediate,
            Stage::Rasterize => &self.rasterize,
        };
        match script.fault {
            Some(Fault::Launch) => {
                return Err(Doc2ImgError::LaunchFailed {
                    stage: inv.stage,
                    program: inv.program.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
            Some(Fault::Timeout) => {
                return Err(Doc2ImgError::StageTimeout {
                    stage: inv.stage,
                    secs: 1,
                })
            }
            None => {}
        }
        for name in &script.writes {
            std::fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
        for name in &script.dirs {
            std::fs::create_dir(dir.join(name)).unwrap();
        }
        Ok(ProcessOutcome {
            exit_code: Some(script.exit_code),
            stderr: script.stderr.clone(),
            stdout_len: 0,
        })
    }
}

fn config(scratch: &Path) -> ConversionConfig {
    ConversionConfig::builder().scratch_dir(scratch).build().unwrap()
}

fn entries_of(archive: &Path) -> Vec<String> {
    let file = std::fs::File::open(archive).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

fn scratch_is_empty(scratch: &Path) -> bool {
    std::fs::read_dir(scratch).unwrap().next().is_none()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn report_docx_becomes_three_page_archive() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::report();

    let archive = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"PK fake docx")
        .unwrap();

    assert_eq!(archive.filename(), "report_images.zip");
    assert_eq!(
        entries_of(archive.path()),
        ["page-1.png", "page-2.png", "page-3.png"]
    );
    assert_eq!(archive.stats.page_count, 3);
    assert_eq!(runner.calls(), [Stage::Intermediate, Stage::Rasterize]);

    // Entries carry the rasteriser's bytes untouched.
    let mut zip = zip::ZipArchive::new(std::fs::File::open(archive.path()).unwrap()).unwrap();
    let mut body = String::new();
    zip.by_name("page-2.png").unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "page-2.png");

    let root = archive.workspace_root().to_path_buf();
    assert!(root.exists(), "workspace lives until delivery is done");
    archive.finish().unwrap();
    assert!(!root.exists());
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn stage_one_failure_reports_stderr_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::fails(1, "macro error\n"),
        StageScript::writes(&["page-1.png"]),
    );

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert!(matches!(
        err,
        Doc2ImgError::Conversion {
            stage: Stage::Intermediate,
            ..
        }
    ));
    assert!(err.to_string().contains("macro error"), "got: {err}");
    assert_eq!(runner.calls(), [Stage::Intermediate], "stage 2 must not run");
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn stage_two_failure_is_attributed_to_rasterizer() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["report.pdf"]),
        StageScript::fails(99, "Syntax Error: Couldn't read xref table"),
    );

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Rasterize));
    assert!(err.to_string().contains("xref"));
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn missing_intermediate_is_ambiguous_output() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(StageScript::default(), StageScript::default());

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    match err {
        Doc2ImgError::AmbiguousOutput { candidates, .. } => assert!(candidates.is_empty()),
        other => panic!("expected AmbiguousOutput, got {other:?}"),
    }
    assert_eq!(runner.calls(), [Stage::Intermediate]);
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn several_unrelated_intermediates_are_ambiguous_output() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["one.pdf", "two.pdf"]),
        StageScript::writes(&["page-1.png"]),
    );

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    match err {
        Doc2ImgError::AmbiguousOutput { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("expected AmbiguousOutput, got {other:?}"),
    }
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn single_differently_named_intermediate_is_accepted() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["Report Final.pdf"]),
        StageScript::writes(&["page-1.png"]),
    );

    let archive = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap();
    assert_eq!(archive.stats.page_count, 1);
}

#[test]
fn zero_pages_with_clean_exit_is_no_output() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["report.pdf"]),
        StageScript::writes(&["notes.txt"]),
    );

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert!(matches!(err, Doc2ImgError::NoOutput { .. }), "got {err:?}");
    assert_eq!(err.kind(), "no_output");
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn uploaded_image_is_not_mistaken_for_a_page() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["page.pdf"]),
        StageScript::writes(&["page-1.png"]),
    );

    let archive = ConversionPipeline::new(&cfg, &runner)
        .run("page.png", b"not really a png")
        .unwrap();
    assert_eq!(archive.packaged.entries, ["page-1.png"]);
}

#[test]
fn launch_failure_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(StageScript::raises(Fault::Launch), StageScript::default());

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert_eq!(err.kind(), "launch_failed");
    assert_eq!(runner.calls(), [Stage::Intermediate]);
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn missing_converter_binary_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = ConversionConfig::builder()
        .office_binary("definitely-not-an-office-suite-3c9a")
        .scratch_dir(scratch.path())
        .build()
        .unwrap();
    let runner = SystemRunner::new(cfg.stage_timeout());

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert!(matches!(
        err,
        Doc2ImgError::LaunchFailed {
            stage: Stage::Intermediate,
            ..
        }
    ));
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn convert_sync_runs_without_a_runtime() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = ConversionConfig::builder()
        .office_binary("definitely-not-an-office-suite-3c9a")
        .scratch_dir(scratch.path())
        .build()
        .unwrap();

    let err = convert_sync("report.docx", b"x", &cfg).unwrap_err();

    assert_eq!(err.kind(), "launch_failed");
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn stage_timeout_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["report.pdf"]),
        StageScript::raises(Fault::Timeout),
    );

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert_eq!(err.kind(), "stage_timeout");
    assert_eq!(err.stage(), Some(Stage::Rasterize));
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn packaging_failure_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    // A directory squatting on the archive path makes the zip unwritable.
    let runner = FakeConverters::new(
        StageScript::writes(&["report.pdf"]),
        StageScript {
            writes: vec!["page-1.png".into()],
            dirs: vec!["report_images.zip".into()],
            ..Default::default()
        },
    );

    let err = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert!(matches!(err, Doc2ImgError::Packaging { .. }), "got {err:?}");
    assert!(scratch_is_empty(scratch.path()));
}

#[test]
fn unsavable_upload_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::report();
    let name = format!("{}.docx", "a".repeat(300));

    let err = ConversionPipeline::new(&cfg, &runner)
        .run(&name, b"x")
        .unwrap_err();

    assert_eq!(err.kind(), "upload_io");
    assert!(runner.calls().is_empty(), "no stage may run without an input");
    assert!(scratch_is_empty(scratch.path()));
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[test]
fn zero_padded_pages_keep_numeric_order() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let pages: Vec<String> = (1..=12).map(|n| format!("page-{n:02}.png")).collect();
    let refs: Vec<&str> = pages.iter().rev().map(String::as_str).collect();
    let runner = FakeConverters::new(StageScript::writes(&["report.pdf"]), StageScript::writes(&refs));

    let archive = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap();
    assert_eq!(archive.packaged.entries, pages);
    assert_eq!(entries_of(archive.path()), pages);
}

#[test]
fn unpadded_pages_follow_filename_order() {
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = FakeConverters::new(
        StageScript::writes(&["report.pdf"]),
        StageScript::writes(&["page-2.png", "page-10.png", "page-1.png"]),
    );

    let archive = ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap();
    // Lexicographic, not numeric: pdftoppm pads, so this only shows up with
    // rasterisers that don't.
    assert_eq!(
        archive.packaged.entries,
        ["page-1.png", "page-10.png", "page-2.png"]
    );
}

// ── Isolation ────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_conversions_get_distinct_workspaces() {
    const N: usize = 16;
    let scratch = tempfile::tempdir().unwrap();
    let cfg = config(scratch.path());
    let runner = Arc::new(FakeConverters::new(
        StageScript::writes(&["doc.pdf"]),
        StageScript::writes(&["page-1.png"]),
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..N {
        let cfg = cfg.clone();
        let runner: Arc<dyn ProcessRunner> = runner.clone();
        tasks.spawn(async move { convert_upload_with("doc.odt", b"x".to_vec(), &cfg, runner).await });
    }

    let mut archives = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        archives.push(joined.unwrap().unwrap());
    }

    let roots: HashSet<PathBuf> = archives
        .iter()
        .map(|a| a.workspace_root().to_path_buf())
        .collect();
    assert_eq!(roots.len(), N);

    // Each converter call ran inside the workspace it was given.
    let seen: HashSet<PathBuf> = runner.roots.lock().unwrap().iter().cloned().collect();
    assert_eq!(seen, roots);

    drop(archives);
    assert!(scratch_is_empty(scratch.path()));
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl ConversionProgressCallback for Recorder {
    fn on_conversion_start(&self, file_name: &str) {
        self.0.lock().unwrap().push(format!("start {file_name}"));
    }
    fn on_stage_start(&self, stage: Stage) {
        self.0.lock().unwrap().push(format!("begin {stage}"));
    }
    fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
        self.0.lock().unwrap().push(format!("end {stage}"));
    }
    fn on_conversion_complete(&self, page_count: usize) {
        self.0.lock().unwrap().push(format!("done {page_count}"));
    }
    fn on_conversion_failed(&self, _error: &str) {
        self.0.lock().unwrap().push("failed".into());
    }
}

#[test]
fn progress_events_follow_the_stages() {
    let scratch = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .scratch_dir(scratch.path())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    ConversionPipeline::new(&cfg, &FakeConverters::report())
        .run("report.docx", b"x")
        .unwrap()
        .finish()
        .unwrap();

    assert_eq!(
        *recorder.0.lock().unwrap(),
        [
            "start report.docx",
            "begin stage1",
            "end stage1",
            "begin stage2",
            "end stage2",
            "done 3"
        ]
    );
}

#[test]
fn progress_reports_failure_once() {
    let scratch = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .scratch_dir(scratch.path())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let runner = FakeConverters::new(StageScript::fails(1, "boom"), StageScript::default());

    ConversionPipeline::new(&cfg, &runner)
        .run("report.docx", b"x")
        .unwrap_err();

    assert_eq!(
        *recorder.0.lock().unwrap(),
        ["start report.docx", "begin stage1", "failed"]
    );
}
