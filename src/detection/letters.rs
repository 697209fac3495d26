//! Character-level crops of a single cell image.
//!
//! Not part of the table pipeline: the crops are meant for an external
//! character classifier, normalised to a fixed square size.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

use crate::config::LetterConfig;
use crate::detection::contours::{self, SortOrder};
use crate::detection::preprocessing;

/// Centre `img` on a black square canvas, then scale it to `size` x `size`.
/// Shrinking uses an area-like filter, enlarging a cubic one.
pub fn resize_to_square(img: &GrayImage, size: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == h {
        return imageops::resize(img, size, size, FilterType::Triangle);
    }
    let side = w.max(h);
    let filter = if side > size {
        FilterType::Triangle
    } else {
        FilterType::CatmullRom
    };

    let mut canvas = GrayImage::from_pixel(side, side, Luma([0u8]));
    let offset_x = (side - w) / 2;
    let offset_y = (side - h) / 2;
    imageops::overlay(&mut canvas, img, offset_x.into(), offset_y.into());

    imageops::resize(&canvas, size, size, filter)
}

/// Cut letter-sized blobs out of a box image, left to right.
///
/// The image is inverted so ink is bright, binarised with a Gaussian
/// adaptive threshold, and every contour whose box is between the configured
/// width bounds (exclusive) and taller than `min_height` is cropped from the
/// inverted image and squared.
pub fn extract_letters(img: &DynamicImage, config: &LetterConfig) -> Vec<GrayImage> {
    let mut gray = preprocessing::to_grayscale(img);
    imageops::invert(&mut gray);
    let bw = preprocessing::adaptive_gaussian_threshold(&gray, 15, -2);

    contours::find_sorted_contours(&bw, SortOrder::LeftToRight)
        .iter()
        .filter(|c| {
            c.width() > config.min_width && c.width() < config.max_width && c.height() > config.min_height
        })
        .map(|c| {
            let crop = imageops::crop_imm(&gray, c.bbox.x, c.bbox.y, c.bbox.width, c.bbox.height).to_image();
            resize_to_square(&crop, config.size)
        })
        .collect()
}
