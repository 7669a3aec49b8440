//! Band-aware slicing of a long image into print-page-sized pieces.
//!
//! Webtoon publishers separate panels with solid black or white gutters.
//! Each slice starts at the cursor and is at least `min_height` tall; past
//! that point the slicer looks for the first horizontal band of
//! `band_height` rows that is entirely black or entirely white and cuts
//! there. When no band exists the slice runs to the end of the image:
//! an over-tall page is preferred to a cut through a panel.
//!
//! Matching is pixel-exact. A band with one pixel off pure black or pure
//! white is not a gutter.
//!
//! Planning ([`plan_slices`]) is pure and separate from writing
//! ([`slice_long_image`]) so the cut decisions can be tested on in-memory
//! images.

use crate::error::PipelineError;
use crate::output::SliceReport;
use crate::pipeline::assemble::remove_stale_images;
use crate::progress::PipelineProgress;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A4 page height in pixels at 72 DPI (841.89 pt, rounded).
pub const A4_HEIGHT_PX: u32 = 842;

/// Default gutter probe thickness in pixels.
pub const DEFAULT_BAND_HEIGHT: u32 = 5;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Slicer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceParams {
    /// No slice is emitted shorter than this.
    pub min_height: u32,
    /// Rows a gutter candidate must span.
    pub band_height: u32,
}

impl Default for SliceParams {
    fn default() -> Self {
        Self {
            min_height: A4_HEIGHT_PX,
            band_height: DEFAULT_BAND_HEIGHT,
        }
    }
}

/// One planned cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpan {
    pub index: usize,
    /// First long-image row of this slice.
    pub top: u32,
    /// Rows taken from the long image.
    pub content_height: u32,
    /// Height of the emitted slice image, `≥ min_height`. Larger than
    /// `content_height` only for a tail shorter than the minimum, which is
    /// padded with black rows.
    pub page_height: u32,
}

/// `true` when rows `[y, y + band_height)` are all pure black or all pure
/// white across the full width.
///
/// Rows below the image bottom read as black, so a probe that overhangs
/// the end can still match black but never white.
pub fn is_solid_band(image: &RgbImage, y: u32, band_height: u32) -> bool {
    let end = y.saturating_add(band_height);
    let overhangs = end > image.height();
    let rows = y.min(image.height())..end.min(image.height());

    let band_is = |colour: Rgb<u8>| {
        rows.clone()
            .all(|row| (0..image.width()).all(|x| *image.get_pixel(x, row) == colour))
    };

    band_is(BLACK) || (!overhangs && band_is(WHITE))
}

/// Decide every slice of `image`.
///
/// For a slice starting at cursor `c` with `remaining = height - c` rows
/// left:
///
/// 1. the candidate height is `remaining`;
/// 2. if `remaining > min_height`, the first `y` in
///    `min_height..remaining` with a solid band at `c + y` becomes the
///    candidate;
/// 3. the slice height is `max(candidate, min_height)`.
///
/// Step 3 never changes the result of step 2, which only yields values at
/// or above the minimum; it is what keeps a short tail at `min_height`.
/// Content heights of the returned spans sum to the image height.
pub fn plan_slices(image: &RgbImage, params: &SliceParams) -> Vec<SliceSpan> {
    let height = image.height();
    let mut spans = Vec::new();
    let mut cursor = 0u32;

    while cursor < height {
        let remaining = height - cursor;
        let mut candidate = remaining;

        if remaining > params.min_height {
            if let Some(y) = (params.min_height..remaining)
                .find(|&y| is_solid_band(image, cursor + y, params.band_height))
            {
                candidate = y;
            }
        }

        let page_height = candidate.max(params.min_height);
        let content_height = page_height.min(remaining);
        debug!(
            "Slice {} at row {}: {} rows (page {})",
            spans.len(),
            cursor,
            content_height,
            page_height
        );
        spans.push(SliceSpan {
            index: spans.len(),
            top: cursor,
            content_height,
            page_height,
        });
        cursor += content_height;
    }

    spans
}

/// Cut `span` out of `image` at full width, padding with black below the
/// image bottom.
pub fn render_slice(image: &RgbImage, span: &SliceSpan) -> RgbImage {
    let mut page = RgbImage::from_pixel(image.width(), span.page_height, BLACK);
    let content =
        image::imageops::crop_imm(image, 0, span.top, image.width(), span.content_height)
            .to_image();
    image::imageops::replace(&mut page, &content, 0, 0);
    page
}

/// File name of slice `index`: `slice_NNN.png`.
pub fn slice_file_name(index: usize) -> String {
    format!("slice_{index:03}.png")
}

/// Slice the long image at `long_image_path` into `output_dir`.
///
/// Slices from an earlier run in `output_dir` are deleted once the long
/// image has been decoded.
pub fn slice_long_image(
    long_image_path: &Path,
    output_dir: &Path,
    params: &SliceParams,
    progress: &dyn PipelineProgress,
) -> Result<SliceReport, PipelineError> {
    std::fs::create_dir_all(output_dir).map_err(|e| PipelineError::io(output_dir, e))?;

    let image = image::open(long_image_path)
        .map_err(|e| PipelineError::ImageDecode {
            path: long_image_path.to_path_buf(),
            detail: e.to_string(),
        })?
        .to_rgb8();
    remove_stale_images(output_dir)?;

    let spans = plan_slices(&image, params);
    for span in &spans {
        let path: PathBuf = output_dir.join(slice_file_name(span.index));
        render_slice(&image, span)
            .save(&path)
            .map_err(|e| PipelineError::ImageWrite {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        progress.on_slice_saved(span.index, span.page_height, &path);
    }

    info!(
        "Sliced {}x{} long image into {} pages",
        image.width(),
        image.height(),
        spans.len()
    );

    Ok(SliceReport {
        output_dir: output_dir.to_path_buf(),
        content_heights: spans.iter().map(|s| s.content_height).collect(),
        page_heights: spans.iter().map(|s| s.page_height).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assemble::collect_images;

    const GREY: Rgb<u8> = Rgb([128, 128, 128]);

    fn grey(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, GREY)
    }

    fn paint_rows(image: &mut RgbImage, from: u32, rows: u32, colour: Rgb<u8>) {
        for y in from..from + rows {
            for x in 0..image.width() {
                image.put_pixel(x, y, colour);
            }
        }
    }

    fn assert_contiguous(spans: &[SliceSpan], height: u32, min: u32) {
        let mut expected_top = 0;
        for s in spans {
            assert_eq!(s.top, expected_top, "gap or overlap at slice {}", s.index);
            assert!(s.page_height >= min, "slice {} below minimum", s.index);
            expected_top += s.content_height;
        }
        assert_eq!(expected_top, height);
    }

    #[test]
    fn black_band_is_detected() {
        let mut img = grey(40, 100);
        paint_rows(&mut img, 50, 5, BLACK);
        assert!(is_solid_band(&img, 50, 5));
        assert!(!is_solid_band(&img, 49, 5));
        assert!(!is_solid_band(&img, 51, 5));
    }

    #[test]
    fn white_band_is_detected() {
        let mut img = grey(40, 100);
        paint_rows(&mut img, 10, 5, WHITE);
        assert!(is_solid_band(&img, 10, 5));
    }

    #[test]
    fn one_stray_pixel_breaks_a_band() {
        let mut img = grey(40, 100);
        paint_rows(&mut img, 50, 5, BLACK);
        img.put_pixel(39, 54, Rgb([0, 0, 1]));
        assert!(!is_solid_band(&img, 50, 5));
    }

    #[test]
    fn mixed_black_and_white_band_is_not_solid() {
        let mut img = grey(40, 100);
        paint_rows(&mut img, 50, 2, BLACK);
        paint_rows(&mut img, 52, 3, WHITE);
        assert!(!is_solid_band(&img, 50, 5));
    }

    #[test]
    fn overhanging_probe_matches_black_only() {
        let mut img = grey(10, 20);
        paint_rows(&mut img, 17, 3, BLACK);
        assert!(is_solid_band(&img, 17, 5));

        let mut img = grey(10, 20);
        paint_rows(&mut img, 17, 3, WHITE);
        assert!(!is_solid_band(&img, 17, 5));
    }

    #[test]
    fn white_gutter_at_1200_sets_first_cut() {
        let mut img = grey(60, 5000);
        paint_rows(&mut img, 1200, 5, WHITE);

        let spans = plan_slices(&img, &SliceParams::default());
        assert_eq!(spans[0].content_height, 1200);
        assert_eq!(spans[0].page_height, 1200);
        // No further gutter: the tail runs to the end in one piece.
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].top, 1200);
        assert_eq!(spans[1].content_height, 3800);
        assert_contiguous(&spans, 5000, A4_HEIGHT_PX);
    }

    #[test]
    fn band_exactly_at_minimum_is_used() {
        let mut img = grey(20, 3000);
        paint_rows(&mut img, 842, 5, BLACK);
        let spans = plan_slices(&img, &SliceParams::default());
        assert_eq!(spans[0].content_height, 842);
    }

    #[test]
    fn band_before_minimum_is_ignored() {
        let mut img = grey(20, 3000);
        paint_rows(&mut img, 400, 5, BLACK);
        let spans = plan_slices(&img, &SliceParams::default());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content_height, 3000);
    }

    #[test]
    fn no_gutter_yields_one_oversized_slice() {
        let img = grey(20, 4000);
        let spans = plan_slices(&img, &SliceParams::default());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].page_height, 4000);
    }

    #[test]
    fn short_tail_is_padded_to_minimum() {
        let img = RgbImage::from_pixel(8, 2000, BLACK);
        let params = SliceParams::default();
        let spans = plan_slices(&img, &params);

        assert_eq!(
            spans.iter().map(|s| s.content_height).collect::<Vec<_>>(),
            vec![842, 842, 316]
        );
        assert_eq!(spans[2].page_height, 842);
        assert_contiguous(&spans, 2000, 842);

        let tail = render_slice(&img, &spans[2]);
        assert_eq!(tail.dimensions(), (8, 842));
    }

    #[test]
    fn image_shorter_than_minimum_is_one_padded_slice() {
        let img = grey(30, 500);
        let spans = plan_slices(&img, &SliceParams::default());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content_height, 500);
        assert_eq!(spans[0].page_height, 842);

        let page = render_slice(&img, &spans[0]);
        assert_eq!(*page.get_pixel(0, 499), GREY);
        assert_eq!(*page.get_pixel(0, 500), BLACK);
    }

    #[test]
    fn many_gutters_keep_every_slice_at_or_above_minimum() {
        let params = SliceParams {
            min_height: 100,
            band_height: 3,
        };
        let mut img = grey(16, 1000);
        for y in (30..1000).step_by(70) {
            paint_rows(&mut img, y, 3.min(1000 - y), WHITE);
        }
        let spans = plan_slices(&img, &params);
        assert_contiguous(&spans, 1000, 100);
        assert!(spans.len() > 1);
    }

    #[test]
    fn slices_are_written_with_padded_names() {
        let tmp = tempfile::tempdir().unwrap();
        let long = tmp.path().join("long.png");
        let mut img = grey(12, 300);
        paint_rows(&mut img, 120, 2, WHITE);
        img.save(&long).unwrap();

        let params = SliceParams {
            min_height: 100,
            band_height: 2,
        };
        let out = tmp.path().join("slices");
        let report =
            slice_long_image(&long, &out, &params, &crate::progress::NoopProgress).unwrap();

        assert_eq!(report.content_heights, vec![120, 180]);
        assert!(out.join("slice_000.png").exists());
        assert!(out.join("slice_001.png").exists());
        let second = image::open(out.join("slice_001.png")).unwrap();
        assert_eq!(second.height(), 180);
    }

    #[test]
    fn reslicing_a_shorter_image_drops_old_slices() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("slices");
        let params = SliceParams {
            min_height: 100,
            band_height: 2,
        };

        let tall = tmp.path().join("tall.png");
        let mut img = grey(8, 500);
        for y in [100, 200, 300, 400] {
            paint_rows(&mut img, y, 2, WHITE);
        }
        img.save(&tall).unwrap();
        let first = slice_long_image(&tall, &out, &params, &crate::progress::NoopProgress).unwrap();
        assert_eq!(first.count(), 5);

        let short = tmp.path().join("short.png");
        grey(8, 150).save(&short).unwrap();
        let second =
            slice_long_image(&short, &out, &params, &crate::progress::NoopProgress).unwrap();

        assert_eq!(second.count(), 1);
        assert_eq!(collect_images(&out).unwrap(), vec![out.join("slice_000.png")]);
        assert_eq!(image::open(out.join("slice_000.png")).unwrap().height(), 150);
    }
}
