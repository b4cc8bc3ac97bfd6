//! Reconstruction of a mission's traveled path into a raster image.

pub mod engine;
pub mod export;
pub mod line;
pub mod raster;
pub mod transform;

pub use engine::MapEngine;
pub use raster::{DirtyRegion, MapRaster};
pub use transform::CoordinateTransform;
