//! Per-request scratch workspaces.
//!
//! Every conversion gets its own root directory named from a random v4 UUID
//! (drawn from the OS CSPRNG), with two fixed children:
//!
//! ```text
//! <scratch>/<prefix><uuid>/
//!   ├─ lo_profile/   office-suite user profile, private to this request
//!   └─ input/        the saved upload
//! ```
//!
//! The private profile is what lets several office-suite processes run at
//! once: a shared profile is locked by the first instance and every other
//! conversion fails until it exits.
//!
//! The root is created with `create_dir`, not `create_dir_all`, so a name
//! collision (or a pre-planted directory) is reported instead of reused.

use crate::config::{INPUT_DIR_NAME, PROFILE_DIR_NAME};
use crate::error::Doc2ImgError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// An isolated scratch area owned by exactly one request.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    root: PathBuf,
    profile_dir: PathBuf,
    input_dir: PathBuf,
}

impl Workspace {
    /// Allocate a fresh workspace under `base_dir`.
    pub fn create(base_dir: &Path, prefix: &str) -> Result<Self, Doc2ImgError> {
        let base = std::path::absolute(base_dir).map_err(|e| Doc2ImgError::Resource {
            path: base_dir.to_path_buf(),
            source: e,
        })?;

        let id = Uuid::new_v4();
        let root = base.join(format!("{prefix}{}", id.as_simple()));
        let profile_dir = root.join(PROFILE_DIR_NAME);
        let input_dir = root.join(INPUT_DIR_NAME);

        let resource = |path: &Path| {
            let path = path.to_path_buf();
            move |source| Doc2ImgError::Resource { path, source }
        };

        std::fs::create_dir(&root).map_err(resource(&root))?;

        let workspace = Self {
            id,
            root,
            profile_dir,
            input_dir,
        };

        // Don't leave a half-built root behind if a child cannot be created.
        if let Err(e) = std::fs::create_dir(&workspace.profile_dir)
            .map_err(resource(&workspace.profile_dir))
            .and_then(|_| {
                std::fs::create_dir(&workspace.input_dir).map_err(resource(&workspace.input_dir))
            })
        {
            let _ = workspace.destroy();
            return Err(e);
        }

        debug!("Created workspace {}", workspace.root.display());
        Ok(workspace)
    }

    /// Opaque unique token of this workspace.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Root directory; stage outputs land here.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Private office-suite profile directory.
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Directory holding the saved upload.
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// The profile directory as a `file://` URL, as the office suite expects
    /// for `-env:UserInstallation=`.
    pub fn profile_url(&self) -> Result<String, Doc2ImgError> {
        url::Url::from_directory_path(&self.profile_dir)
            .map(|u| u.to_string())
            .map_err(|_| {
                Doc2ImgError::Internal(format!(
                    "Profile path is not absolute: {}",
                    self.profile_dir.display()
                ))
            })
    }

    /// Write the uploaded bytes into `input/` under a sanitised name.
    ///
    /// Returns the saved path.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, Doc2ImgError> {
        let path = self.input_dir.join(sanitize_file_name(file_name));
        std::fs::write(&path, bytes).map_err(|e| Doc2ImgError::UploadIo {
            path: path.clone(),
            source: e,
        })?;
        debug!("Saved upload: {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Whether the root directory is currently present on disk.
    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Recursively remove the root directory.
    ///
    /// Removing an already-absent workspace is a no-op.
    pub fn destroy(&self) -> Result<(), Doc2ImgError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!("Removed workspace {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Doc2ImgError::Resource {
                path: self.root.clone(),
                source: e,
            }),
        }
    }
}

/// Reduce an untrusted upload name to a single safe path component.
///
/// Keeps only the final component, drops control characters and leading
/// dots, and falls back to `upload` when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> String {
    // Treat both separators as separators regardless of host OS.
    let normalised = name.replace('\\', "/");
    let last = Path::new(&normalised)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .next_back()
        .unwrap_or_default();

    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
