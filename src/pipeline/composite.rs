//! PDF → one tall image.
//!
//! Every page of the merged PDF is rasterised at its intrinsic resolution
//! (scale 1.0, so one point becomes one pixel) and the results are stacked
//! top to bottom on a black canvas as wide as the widest page. Narrower
//! pages sit flush left; the strip to their right stays black.
//!
//! Everything here is blocking; callers run it inside `spawn_blocking`.

use crate::error::PipelineError;
use crate::output::LongImageInfo;
use image::{imageops, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Rasterise every page of `pdf_path`, in page order.
pub fn render_pdf_pages(pdfium: &Pdfium, pdf_path: &Path) -> Result<Vec<RgbImage>, PipelineError> {
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| PipelineError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(PipelineError::EmptyPdf {
            path: pdf_path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(1.0);
    let mut rendered = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        rendered.push(image);
    }

    Ok(rendered)
}

/// Stack `pages` vertically, flush left, on a black canvas.
///
/// Returns `None` for an empty slice.
pub fn stack_pages(pages: &[RgbImage]) -> Option<RgbImage> {
    let width = pages.iter().map(RgbImage::width).max()?;
    let height: u32 = pages.iter().map(RgbImage::height).sum();

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let mut y: i64 = 0;
    for page in pages {
        imageops::replace(&mut canvas, page, 0, y);
        y += i64::from(page.height());
    }
    Some(canvas)
}

/// Render `pdf_path` and save the stacked result as a PNG at `output_path`.
pub fn pdf_to_long_image(
    pdfium: &Pdfium,
    pdf_path: &Path,
    output_path: &Path,
) -> Result<LongImageInfo, PipelineError> {
    let pages = render_pdf_pages(pdfium, pdf_path)?;
    let page_heights: Vec<u32> = pages.iter().map(RgbImage::height).collect();

    let canvas = stack_pages(&pages).ok_or_else(|| PipelineError::EmptyPdf {
        path: pdf_path.to_path_buf(),
    })?;
    drop(pages);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    canvas
        .save(output_path)
        .map_err(|e| PipelineError::ImageWrite {
            path: output_path.to_path_buf(),
            detail: e.to_string(),
        })?;

    info!(
        "Long image written: {} ({}x{} px)",
        output_path.display(),
        canvas.width(),
        canvas.height()
    );
    Ok(LongImageInfo {
        path: output_path.to_path_buf(),
        width: canvas.width(),
        height: canvas.height(),
        page_heights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(width: u32, height: u32, shade: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]))
    }

    #[test]
    fn canvas_is_widest_page_by_total_height() {
        let pages = vec![page(800, 1000, 200), page(600, 1000, 150), page(700, 100, 90)];
        let canvas = stack_pages(&pages).unwrap();
        assert_eq!(canvas.dimensions(), (800, 2100));
    }

    #[test]
    fn narrow_pages_are_flush_left_on_black() {
        let pages = vec![page(800, 1000, 200), page(600, 1000, 150)];
        let canvas = stack_pages(&pages).unwrap();

        assert_eq!(canvas.get_pixel(0, 0), &Rgb([200, 200, 200]));
        assert_eq!(canvas.get_pixel(0, 1000), &Rgb([150, 150, 150]));
        assert_eq!(canvas.get_pixel(599, 1999), &Rgb([150, 150, 150]));
        assert_eq!(canvas.get_pixel(600, 1000), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(799, 1999), &Rgb([0, 0, 0]));
    }

    #[test]
    fn page_order_is_top_to_bottom() {
        let pages = vec![page(10, 3, 1), page(10, 2, 2), page(10, 4, 3)];
        let canvas = stack_pages(&pages).unwrap();
        let column: Vec<u8> = (0..canvas.height()).map(|y| canvas.get_pixel(5, y)[0]).collect();
        assert_eq!(column, vec![1, 1, 1, 2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn no_pages_no_canvas() {
        assert!(stack_pages(&[]).is_none());
    }
}
