use image::{Rgb, RgbImage};

use super::line::{line_pixels, PixelCoord};
use super::transform::CoordinateTransform;

pub const BACKGROUND: Rgb<u8> = Rgb([24, 24, 24]);
pub const PATH: Rgb<u8> = Rgb([80, 160, 255]);
pub const START_MARKER: Rgb<u8> = Rgb([60, 200, 90]);
pub const HEADING_MARKER: Rgb<u8> = Rgb([230, 70, 60]);

/// Inclusive pixel bounds touched since the last [`MapRaster::take_dirty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRegion {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl DirtyRegion {
    fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

pub struct MapRaster {
    image: RgbImage,
    transform: Option<CoordinateTransform>,
    dirty: Option<DirtyRegion>,
}

impl MapRaster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width.max(1), height.max(1), BACKGROUND),
            transform: None,
            dirty: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn transform(&self) -> Option<&CoordinateTransform> {
        self.transform.as_ref()
    }

    /// Fixes the transform on first use; later calls return the existing one
    /// untouched.
    pub fn establish_transform(
        &mut self,
        make: impl FnOnce(u32, u32) -> CoordinateTransform,
    ) -> CoordinateTransform {
        let (width, height) = (self.width(), self.height());
        *self.transform.get_or_insert_with(|| make(width, height))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        *self.image.get_pixel(x, y)
    }

    pub fn is_painted(&self, x: u32, y: u32) -> bool {
        self.pixel(x, y) != BACKGROUND
    }

    /// Nearest in-bounds pixel.
    pub fn clip(&self, coord: PixelCoord) -> (u32, u32) {
        let max_x = i64::from(self.width() - 1);
        let max_y = i64::from(self.height() - 1);
        (coord.0.clamp(0, max_x) as u32, coord.1.clamp(0, max_y) as u32)
    }

    pub fn paint(&mut self, coord: PixelCoord, color: Rgb<u8>) {
        let (x, y) = self.clip(coord);
        self.image.put_pixel(x, y, color);
        match self.dirty.as_mut() {
            Some(region) => region.include(x, y),
            None => self.dirty = Some(DirtyRegion::point(x, y)),
        }
    }

    pub fn draw_line(&mut self, from: PixelCoord, to: PixelCoord, color: Rgb<u8>) {
        for coord in line_pixels(from, to) {
            self.paint(coord, color);
        }
    }

    /// Filled square of side `2 * radius + 1` centered on `center`.
    pub fn draw_marker(&mut self, center: PixelCoord, radius: i64, color: Rgb<u8>) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                self.paint((center.0 + dx, center.1 + dy), color);
            }
        }
    }

    pub fn take_dirty(&mut self) -> Option<DirtyRegion> {
        self.dirty.take()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}
