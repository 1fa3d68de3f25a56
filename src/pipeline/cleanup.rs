//! Workspace cleanup, exactly once per request.
//!
//! A [`CleanupScheduler`] takes ownership of a [`Workspace`] the moment it is
//! created. From then on the workspace is removed by exactly one of:
//!
//! * [`CleanupScheduler::cleanup_now`] on a pipeline failure;
//! * [`DeferredCleanup::complete`] or dropping the [`DeferredCleanup`]
//!   after a successful result has been delivered;
//! * dropping the scheduler itself, if the pipeline unwinds from a panic.
//!
//! All three paths go through one completion flag, so a second attempt is a
//! no-op regardless of ordering.

use crate::error::Doc2ImgError;
use crate::workspace::Workspace;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Owns a workspace and guarantees it is destroyed once.
#[derive(Debug)]
pub struct CleanupScheduler {
    workspace: Workspace,
    completed: AtomicBool,
}

impl CleanupScheduler {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            completed: AtomicBool::new(false),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Whether the workspace has already been destroyed.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Destroy the workspace immediately.
    pub fn cleanup_now(self) -> Result<(), Doc2ImgError> {
        self.run_once().unwrap_or(Ok(()))
    }

    /// Defer destruction until the returned handle is completed or dropped.
    pub fn schedule_cleanup(self) -> DeferredCleanup {
        debug!(
            "Workspace {} scheduled for cleanup after delivery",
            self.workspace.id()
        );
        DeferredCleanup { inner: self }
    }

    /// Destroy the workspace unless that already happened.
    ///
    /// Returns `None` when a previous call won the completion flag.
    fn run_once(&self) -> Option<Result<(), Doc2ImgError>> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.workspace.destroy())
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.run_once() {
            warn!("Failed to remove workspace {}: {}", self.workspace.root().display(), e);
        }
    }
}

/// Post-delivery cleanup hook for a successful conversion.
///
/// Keep it alive for as long as the archive is being read; the HTTP layer
/// moves it into the response body so removal happens after the last byte
/// is sent.
#[derive(Debug)]
#[must_use = "dropping a DeferredCleanup removes the workspace immediately"]
pub struct DeferredCleanup {
    inner: CleanupScheduler,
}

impl DeferredCleanup {
    pub fn workspace(&self) -> &Workspace {
        self.inner.workspace()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    /// Run the cleanup now and report its outcome.
    pub fn complete(self) -> Result<(), Doc2ImgError> {
        self.inner.run_once().unwrap_or(Ok(()))
    }
}
