//! Image directory → PDF document.
//!
//! Used twice per chapter: once to merge the downloaded pages, once to
//! assemble the final PDF from the slices. Images are taken in
//! lexicographic file-name order, which is why every file the pipeline
//! names carries a fixed-width zero-padded number.
//!
//! Each image becomes one page sized to its pixel dimensions at 72 DPI
//! (one pixel per point), so rendering the PDF back at its intrinsic
//! resolution reproduces the original pixel sizes.

use crate::error::PipelineError;
use crate::output::AssembledPdf;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-name suffix of the images a directory is expected to hold.
pub const IMAGE_EXTENSION: &str = ".png";

/// List the images in `dir`, sorted by file name.
///
/// Fails with [`PipelineError::NoImagesFound`] when there are none.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if is_image_file(&path) {
            images.push(path);
        }
    }

    if images.is_empty() {
        return Err(PipelineError::NoImagesFound {
            dir: dir.to_path_buf(),
        });
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Delete the images [`collect_images`] would pick up from `dir`.
///
/// Stages that write into a chapter folder call this first, so a re-run
/// never merges leftovers from an earlier run. Other files and
/// subdirectories are left alone; a missing `dir` removes nothing.
pub fn remove_stale_images(dir: &Path) -> Result<usize, PipelineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(PipelineError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        if is_image_file(&path) {
            std::fs::remove_file(&path).map_err(|e| PipelineError::io(&path, e))?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Removed {} stale images from {}", removed, dir.display());
    }
    Ok(removed)
}

fn is_image_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(IMAGE_EXTENSION))
        .unwrap_or(false)
        && path.is_file()
}

/// Page size in points for an image of `width` × `height` pixels.
pub fn page_size_for(width: u32, height: u32) -> (PdfPoints, PdfPoints) {
    (PdfPoints::new(width as f32), PdfPoints::new(height as f32))
}

/// Compose every image in `image_dir` into one PDF at `output_pdf`.
pub fn images_to_pdf(
    pdfium: &Pdfium,
    image_dir: &Path,
    output_pdf: &Path,
) -> Result<AssembledPdf, PipelineError> {
    let images = collect_images(image_dir)?;
    let write_err = |detail: String| PipelineError::PdfWrite {
        path: output_pdf.to_path_buf(),
        detail,
    };

    let mut document = pdfium
        .create_new_pdf()
        .map_err(|e| write_err(format!("{e:?}")))?;

    for path in &images {
        let page_image = DynamicImage::ImageRgb8(
            image::open(path)
                .map_err(|e| PipelineError::ImageDecode {
                    path: path.clone(),
                    detail: e.to_string(),
                })?
                .to_rgb8(),
        );
        let (width, height) = page_size_for(page_image.width(), page_image.height());

        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(|e| write_err(format!("{}: {e:?}", path.display())))?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::new(0.0),
                PdfPoints::new(0.0),
                &page_image,
                Some(width),
                Some(height),
            )
            .map_err(|e| write_err(format!("{}: {e:?}", path.display())))?;

        debug!(
            "Added {} as a {}x{} page",
            path.display(),
            page_image.width(),
            page_image.height()
        );
    }

    if let Some(parent) = output_pdf.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    document
        .save_to_file(output_pdf)
        .map_err(|e| write_err(format!("{e:?}")))?;

    info!("PDF written: {} ({} pages)", output_pdf.display(), images.len());
    Ok(AssembledPdf {
        path: output_pdf.to_path_buf(),
        page_count: images.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn images_sorted_by_name_and_filtered_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["slice_010.png", "slice_002.png", "slice_001.png", "notes.txt", "cover.PNG"] {
            touch(tmp.path(), name);
        }
        std::fs::create_dir(tmp.path().join("nested.png")).unwrap();

        let names: Vec<String> = collect_images(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["slice_001.png", "slice_002.png", "slice_010.png"]);
    }

    #[test]
    fn empty_directory_is_structural_error() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "readme.md");
        let err = collect_images(tmp.path()).unwrap_err();
        assert!(matches!(err, PipelineError::NoImagesFound { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = collect_images(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn stale_images_removed_other_files_kept() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["slice_000.png", "slice_004.png", "notes.txt"] {
            touch(tmp.path(), name);
        }
        std::fs::create_dir(tmp.path().join("nested.png")).unwrap();

        assert_eq!(remove_stale_images(tmp.path()).unwrap(), 2);
        assert!(tmp.path().join("notes.txt").is_file());
        assert!(tmp.path().join("nested.png").is_dir());
        assert!(matches!(
            collect_images(tmp.path()),
            Err(PipelineError::NoImagesFound { .. })
        ));
        assert_eq!(remove_stale_images(&tmp.path().join("absent")).unwrap(), 0);
    }

    #[test]
    fn one_point_per_pixel() {
        let (w, h) = page_size_for(690, 1500);
        assert_eq!(w.value, 690.0);
        assert_eq!(h.value, 1500.0);
    }
}
