use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::morphology::{self, Mask, grayscale_erode};

use crate::config::{CellEnhancement, ExtractionConfig};
use crate::models::Orientation;

/// Binary masks holding only long horizontal and long vertical structures
#[derive(Debug, Clone)]
pub struct LineMasks {
    pub horizontal: GrayImage,
    pub vertical: GrayImage,
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Scale an image to the given height, keeping its aspect ratio
pub fn resize_to_height(img: &DynamicImage, height: u32) -> DynamicImage {
    if img.height() == height || img.height() == 0 {
        return img.clone();
    }
    let ratio = height as f64 / img.height() as f64;
    let width = ((img.width() as f64 * ratio) as u32).max(1);
    img.resize_exact(width, height, FilterType::Triangle)
}

/// Mean-based adaptive threshold: a pixel becomes foreground (255) when it
/// exceeds the mean of its `block_size` neighbourhood minus `offset`.
pub fn adaptive_mean_threshold(img: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let radius = block_size / 2;
    let mean = box_filter(img, radius, radius);
    threshold_against(img, &mean, offset)
}

/// Same as [`adaptive_mean_threshold`] with a Gaussian-weighted neighbourhood
pub fn adaptive_gaussian_threshold(img: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    // Kernel sigma for a given aperture, as used by common vision libraries
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let weighted = gaussian_blur_f32(img, sigma.max(0.1));
    threshold_against(img, &weighted, offset)
}

fn threshold_against(img: &GrayImage, local: &GrayImage, offset: i16) -> GrayImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let limit = local.get_pixel(x, y)[0] as i16 - offset;
        if img.get_pixel(x, y)[0] as i16 > limit {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Min (erosion) or max (dilation) over a window of `before + 1 + after`
/// samples centred on each element of `line`, using the van Herk/Gil-Werman
/// block decomposition: three comparisons per sample whatever the window.
/// Samples past either end are ignored.
fn sliding_extreme(line: &[u8], before: usize, after: usize, erode: bool, out: &mut [u8]) {
    let (pad, pick): (u8, fn(u8, u8) -> u8) = if erode { (u8::MAX, u8::min) } else { (0, u8::max) };
    let k = before + after + 1;

    let mut padded = vec![pad; before];
    padded.extend_from_slice(line);
    padded.resize(padded.len() + after, pad);
    let n = padded.len();

    let mut prefix = padded.clone();
    for i in 1..n {
        if i % k != 0 {
            prefix[i] = pick(prefix[i - 1], padded[i]);
        }
    }
    let mut suffix = padded.clone();
    for i in (0..n - 1).rev() {
        if i % k != k - 1 {
            suffix[i] = pick(suffix[i + 1], padded[i]);
        }
    }

    for (i, o) in out.iter_mut().enumerate() {
        *o = pick(suffix[i], prefix[i + k - 1]);
    }
}

/// Erode (or dilate) every row or column with a flat line element of `len`
/// pixels. Dilation uses the reflected element so that erosion followed by
/// dilation is a true opening.
fn line_filter(img: &GrayImage, len: u32, orientation: Orientation, erode: bool) -> GrayImage {
    let len = len.max(1) as usize;
    let (before, after) = if erode {
        (len / 2, len - 1 - len / 2)
    } else {
        (len - 1 - len / 2, len / 2)
    };
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    match orientation {
        Orientation::Horizontal => {
            let row_len = w as usize;
            let mut filtered = vec![0u8; row_len];
            for (src, dst) in img.as_raw().chunks_exact(row_len).zip(out.chunks_exact_mut(row_len)) {
                sliding_extreme(src, before, after, erode, &mut filtered);
                dst.copy_from_slice(&filtered);
            }
        }
        Orientation::Vertical => {
            let mut column = vec![0u8; h as usize];
            let mut filtered = vec![0u8; h as usize];
            for x in 0..w {
                for (y, v) in column.iter_mut().enumerate() {
                    *v = img.get_pixel(x, y as u32)[0];
                }
                sliding_extreme(&column, before, after, erode, &mut filtered);
                for (y, v) in filtered.iter().enumerate() {
                    out.put_pixel(x, y as u32, Luma([*v]));
                }
            }
        }
    }
    out
}

/// Erode then dilate with a line-shaped element, keeping only runs at least
/// as long as the element along its axis.
fn open_along(img: &GrayImage, len: u32, orientation: Orientation) -> GrayImage {
    let eroded = line_filter(img, len, orientation, true);
    line_filter(&eroded, len, orientation, false)
}

/// Blur only the pixels lying on detected edges of a mask
pub fn smooth_edges(mask: &GrayImage, block_size: u32) -> GrayImage {
    let edges = adaptive_mean_threshold(mask, block_size, -2);
    let edges = morphology::dilate(&edges, Norm::LInf, 1);
    let blurred = box_filter(mask, 1, 1);

    let mut out = mask.clone();
    for (x, y, edge) in edges.enumerate_pixels() {
        if edge[0] != 0 {
            out.put_pixel(x, y, *blurred.get_pixel(x, y));
        }
    }
    out
}

/// Split an image into masks of its long horizontal and vertical rules.
///
/// Intensities are inverted so ink becomes foreground, binarised with an
/// adaptive threshold to cope with uneven lighting, then opened along each
/// axis with an element of `extent / line_scale_divisor` pixels.
pub fn isolate_lines(img: &DynamicImage, config: &ExtractionConfig) -> LineMasks {
    let mut gray = to_grayscale(img);
    imageops::invert(&mut gray);
    let bw = adaptive_mean_threshold(&gray, config.adaptive_block_size, config.adaptive_offset);

    let divisor = config.line_scale_divisor.max(1);
    let horizontal = open_along(&bw, bw.width() / divisor, Orientation::Horizontal);
    let vertical = open_along(&bw, bw.height() / divisor, Orientation::Vertical);

    LineMasks {
        horizontal: smooth_edges(&horizontal, config.smoothing_block_size),
        vertical: smooth_edges(&vertical, config.smoothing_block_size),
    }
}

/// Overlay both line masks into one binary table mask.
///
/// The equal-weight blend is inverted (rules dark, paper white), eroded twice
/// with a 2x2 element to close thin joints, then binarised with Otsu's level.
/// Cell interiors and the page background end up as separate white regions,
/// so each table shows up as a hole in the background.
pub fn combine_masks(masks: &LineMasks) -> GrayImage {
    let (w, h) = masks.horizontal.dimensions();
    let mut blended: GrayImage = ImageBuffer::from_fn(w, h, |x, y| {
        let a = masks.vertical.get_pixel(x, y)[0] as u16;
        let b = masks.horizontal.get_pixel(x, y)[0] as u16;
        Luma([((a + b + 1) / 2) as u8])
    });
    imageops::invert(&mut blended);

    let joint = Mask::from_image(&GrayImage::from_pixel(2, 2, Luma([255u8])), 1, 1);
    let eroded = grayscale_erode(&grayscale_erode(&blended, &joint), &joint);

    let level = otsu_level(&eroded);
    ImageBuffer::from_fn(w, h, |x, y| {
        if eroded.get_pixel(x, y)[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Linear contrast (`alpha`) and brightness (`beta`) adjustment
pub fn adjust_brightness(img: &GrayImage, alpha: f32, beta: f32) -> GrayImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0] as f32 * alpha + beta;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Sharpen with an unsharp mask. Pixels whose difference from the blurred
/// image is below `threshold` are left unchanged.
pub fn unsharp_mask(img: &GrayImage, sigma: f32, amount: f32, threshold: u8) -> GrayImage {
    let blurred = gaussian_blur_f32(img, sigma);
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let original = img.get_pixel(x, y)[0];
        let soft = blurred.get_pixel(x, y)[0];
        if threshold > 0 && original.abs_diff(soft) < threshold {
            return Luma([original]);
        }
        let v = (amount + 1.0) * original as f32 - amount * soft as f32;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Apply the configured enhancement to a cell crop before recognition
pub fn enhance_cell(img: &DynamicImage, enhancement: &CellEnhancement) -> DynamicImage {
    if enhancement.is_identity() {
        return img.clone();
    }
    let mut gray = adjust_brightness(&to_grayscale(img), enhancement.contrast, enhancement.brightness);
    if enhancement.sharpen_amount > 0.0 {
        gray = unsharp_mask(
            &gray,
            enhancement.sharpen_sigma,
            enhancement.sharpen_amount,
            enhancement.sharpen_threshold,
        );
    }
    DynamicImage::ImageLuma8(gray)
}
