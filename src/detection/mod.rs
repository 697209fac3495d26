//! Structural extraction stages, leaves first: line isolation, contour
//! ordering, table classification, grid reconstruction and layout matching.

pub mod contours;
pub mod grid;
pub mod layout;
pub mod letters;
pub mod preprocessing;
pub mod tables;

pub use contours::SortOrder;
pub use grid::GridLines;
pub use layout::Layout;
pub use preprocessing::LineMasks;
