//! Progress-callback trait for stage-level conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe a
//! conversion as it moves through its stages. The pipeline runs on a blocking
//! thread, so implementations must be `Send + Sync`; every method has a no-op
//! default so callers override only what they need.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2img::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl ConversionProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, _stage: Stage, _elapsed_ms: u64) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(StageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::Stage;
use std::sync::Arc;

/// Called by the conversion pipeline as a request advances.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the workspace exists and the upload has been saved.
    fn on_conversion_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Called just before an external converter is launched.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after a stage's output has been validated.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once after the archive has been written.
    fn on_conversion_complete(&self, page_count: usize) {
        let _ = page_count;
    }

    /// Called once when the request fails, before its workspace is removed.
    fn on_conversion_failed(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
