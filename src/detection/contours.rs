use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use imageproc::contours::{self, BorderType};

use crate::models::{BoundingBox, Contour};

/// Order in which contours are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl SortOrder {
    fn key(self, bbox: &BoundingBox) -> u32 {
        match self {
            SortOrder::LeftToRight | SortOrder::RightToLeft => bbox.x,
            SortOrder::TopToBottom | SortOrder::BottomToTop => bbox.y,
        }
    }

    fn is_reversed(self) -> bool {
        matches!(self, SortOrder::RightToLeft | SortOrder::BottomToTop)
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left-to-right" => Ok(SortOrder::LeftToRight),
            "right-to-left" => Ok(SortOrder::RightToLeft),
            "top-to-bottom" => Ok(SortOrder::TopToBottom),
            "bottom-to-top" => Ok(SortOrder::BottomToTop),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortOrder::LeftToRight => "left-to-right",
            SortOrder::RightToLeft => "right-to-left",
            SortOrder::TopToBottom => "top-to-bottom",
            SortOrder::BottomToTop => "bottom-to-top",
        };
        f.write_str(name)
    }
}

/// Trace every region and hole boundary in a mask. Any non-zero pixel is
/// foreground. Contours come back in discovery (raster) order.
pub fn find_contours(mask: &GrayImage) -> Vec<Contour> {
    contours::find_contours::<i32>(mask)
        .into_iter()
        .filter_map(|c| {
            let bbox = BoundingBox::from_points(&c.points)?;
            Some(Contour {
                points: c.points,
                bbox,
                is_hole: matches!(c.border_type, BorderType::Hole),
            })
        })
        .collect()
}

/// Stable sort on the primary coordinate of each bounding box only.
/// Contours sharing that coordinate keep their relative order, in both the
/// ascending and the reversed modes.
pub fn sort_contours(contours: &mut [Contour], order: SortOrder) {
    if order.is_reversed() {
        contours.sort_by(|a, b| order.key(&b.bbox).cmp(&order.key(&a.bbox)));
    } else {
        contours.sort_by_key(|c| order.key(&c.bbox));
    }
}

/// Find contours in a mask and return them in the requested order.
/// An empty result is not an error here.
pub fn find_sorted_contours(mask: &GrayImage, order: SortOrder) -> Vec<Contour> {
    let mut found = find_contours(mask);
    sort_contours(&mut found, order);
    found
}
