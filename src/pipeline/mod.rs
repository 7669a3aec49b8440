//! Pipeline stages for turning a page sequence into a finished chapter PDF.
//!
//! Each submodule implements one transformation step and can be driven on
//! its own; [`crate::process`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! download ──▶ assemble ──▶ composite ──▶ slice ──▶ assemble
//!  (HTTP)     (merged PDF)  (long PNG)   (slices)  (final PDF)
//! ```
//!
//! 1. [`download`]  fetch numbered pages until the sequence runs out
//! 2. [`assemble`]  compose a directory of images into a PDF, one page each
//! 3. [`composite`] render every PDF page and stack them into one tall image
//! 4. [`slice`]     cut the tall image at solid black or white bands
//!
//! Stages 2 to 4 use pdfium, which is blocking. They take a bound
//! [`Pdfium`] so a caller can bind once and reuse it for the whole chapter.

pub mod assemble;
pub mod composite;
pub mod download;
pub mod slice;

use crate::error::PipelineError;
use pdfium_render::prelude::Pdfium;
use std::path::Path;

/// Bind pdfium from an explicit library path, or the usual search order.
pub fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, PipelineError> {
    let bound = match library_path {
        Some(path) => pdfium_fetch::bind_library(path),
        None => pdfium_fetch::bind_default(),
    };
    bound.map_err(|e| PipelineError::PdfiumBindingFailed(e.to_string()))
}
