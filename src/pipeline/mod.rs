//! Pipeline stages for document-to-images conversion.
//!
//! Each submodule implements one step; [`crate::convert::ConversionPipeline`]
//! sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ intermediate ──▶ rasterize ──▶ package ──▶ cleanup
//! (bytes)    (libreoffice)    (pdftoppm)    (zip)       (rm -r)
//! ```
//!
//! 1. [`process`]      run one external command, capture exit code + stderr
//! 2. [`intermediate`] office-suite invocation and PDF discovery
//! 3. [`rasterize`]    rasteriser invocation, page collection and ordering
//! 4. [`package`]      write ordered pages into a fresh zip archive
//! 5. [`cleanup`]      remove the workspace exactly once

pub mod cleanup;
pub mod intermediate;
pub mod package;
pub mod process;
pub mod rasterize;
