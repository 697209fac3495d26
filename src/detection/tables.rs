use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::detection::contours::{self, SortOrder};
use crate::models::TableRegion;

/// Deterministic name of the `rank`-th table cut from `source_stem`
pub fn table_name(rank: usize, source_stem: &str) -> String {
    format!("{:02}_{}", rank, source_stem)
}

/// Select table-sized regions of the combined line mask and crop them out
/// of the working page.
///
/// Contours are taken top-to-bottom; a region is kept when its bounding-box
/// area lies within the configured inclusive bounds. An empty result means
/// no table was detected and is left for the caller to report.
pub fn classify_tables(
    page: &DynamicImage,
    combined: &GrayImage,
    config: &ExtractionConfig,
    source_stem: &str,
) -> Vec<TableRegion> {
    let found = contours::find_sorted_contours(combined, SortOrder::TopToBottom);

    let regions: Vec<TableRegion> = found
        .iter()
        .filter(|c| (config.min_table_area..=config.max_table_area).contains(&c.area()))
        .map(|c| c.bbox.clamp_to(page.width(), page.height()))
        .filter(|bbox| !bbox.is_empty())
        .enumerate()
        .map(|(rank, bbox)| TableRegion {
            rank,
            name: table_name(rank, source_stem),
            bbox,
            image: page.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height),
        })
        .collect();

    debug!(
        contours = found.len(),
        tables = regions.len(),
        "classified table regions"
    );
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use image::Luma;

    /// Page mask with white paper and dark 2x2-cell grids drawn over each box
    fn outlined(width: u32, height: u32, boxes: &[BoundingBox]) -> GrayImage {
        let mut mask = GrayImage::from_pixel(width, height, Luma([255u8]));
        for b in boxes {
            let mid_y = b.y + b.height / 2;
            let mid_x = b.x + b.width / 2;
            for x in b.x..b.right() {
                for t in 0..3 {
                    mask.put_pixel(x, b.y + t, Luma([0]));
                    mask.put_pixel(x, mid_y + t, Luma([0]));
                    mask.put_pixel(x, b.bottom() - 1 - t, Luma([0]));
                }
            }
            for y in b.y..b.bottom() {
                for t in 0..3 {
                    mask.put_pixel(b.x + t, y, Luma([0]));
                    mask.put_pixel(mid_x + t, y, Luma([0]));
                    mask.put_pixel(b.right() - 1 - t, y, Luma([0]));
                }
            }
        }
        mask
    }

    #[test]
    fn keeps_only_regions_in_area_band() {
        let boxes = [
            BoundingBox::new(50, 50, 600, 300),  // 180k, kept
            BoundingBox::new(50, 400, 200, 200), // 40k, too small
            BoundingBox::new(50, 650, 900, 400), // 360k, kept
        ];
        let mask = outlined(1200, 1200, &boxes);
        let page = DynamicImage::ImageLuma8(mask.clone());

        let tables = classify_tables(&page, &mask, &ExtractionConfig::default(), "sheet");
        assert_eq!(tables.len(), 2);
        assert!(tables[0].bbox.y < tables[1].bbox.y);
        assert_eq!(tables[0].name, "00_sheet");
        assert_eq!(tables[1].name, "01_sheet");
        for t in &tables {
            assert!((130_000..=900_000).contains(&t.bbox.area()));
            assert_eq!(t.image.width(), t.bbox.width);
            assert_eq!(t.image.height(), t.bbox.height);
        }
    }

    #[test]
    fn area_bounds_are_inclusive() {
        let mask = outlined(1200, 1000, &[BoundingBox::new(100, 100, 600, 300)]);
        let page = DynamicImage::ImageLuma8(mask.clone());
        let found = classify_tables(&page, &mask, &ExtractionConfig::default(), "edge");
        assert_eq!(found.len(), 1);
        let area = found[0].bbox.area();

        let count = |min: u64, max: u64| {
            let config = ExtractionConfig::default().with_table_area(min, max);
            classify_tables(&page, &mask, &config, "edge").len()
        };
        assert_eq!(count(area, 900_000), 1);
        assert_eq!(count(130_000, area), 1);
        assert_eq!(count(area, area), 1);
        assert_eq!(count(area + 1, 900_000), 0);
        assert_eq!(count(130_000, area - 1), 0);
    }

    #[test]
    fn blank_page_yields_nothing() {
        let mask = GrayImage::from_pixel(1200, 1000, Luma([255u8]));
        let page = DynamicImage::ImageLuma8(mask.clone());
        assert!(classify_tables(&page, &mask, &ExtractionConfig::default(), "blank").is_empty());
    }
}
