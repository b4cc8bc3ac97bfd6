use crate::config::MapConfig;
use crate::models::MapMetadata;

use super::line::PixelCoord;

/// Device-unit to pixel mapping of one mission's raster. Image rows grow
/// with device `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    /// Pixels per device unit.
    pub scale: f64,
    /// Device coordinate placed at `origin_px`.
    pub origin: (f64, f64),
    pub origin_px: (f64, f64),
}

impl CoordinateTransform {
    /// Places `first` at the canvas center.
    pub fn centered_on(first: (f64, f64), width: u32, height: u32, scale: f64) -> Self {
        Self {
            scale,
            origin: first,
            origin_px: (f64::from(width / 2), f64::from(height / 2)),
        }
    }

    /// Pixels per device unit such that a room of `max_room_extent` fits the
    /// canvas in every direction from a centered start.
    pub fn scale_for(config: &MapConfig) -> f64 {
        if let Some(scale) = config.scale.filter(|s| s.is_finite() && *s > 0.0) {
            return scale;
        }
        let span = f64::from(config.width.min(config.height));
        span / (2.0 * config.max_room_extent)
    }

    pub fn to_pixel(&self, x: f64, y: f64) -> PixelCoord {
        let px = self.origin_px.0 + (x - self.origin.0) * self.scale;
        let py = self.origin_px.1 + (y - self.origin.1) * self.scale;
        (px.round() as i64, py.round() as i64)
    }

    pub fn metadata(&self, width: u32, height: u32) -> MapMetadata {
        MapMetadata {
            width,
            height,
            scale: self.scale,
            origin: self.origin,
            origin_px: self.origin_px,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_from_extent() {
        let config = MapConfig {
            width: 400,
            height: 200,
            max_room_extent: 50.0,
            ..MapConfig::default()
        };
        assert_eq!(CoordinateTransform::scale_for(&config), 2.0);
    }

    #[test]
    fn test_explicit_scale_wins() {
        let config = MapConfig {
            scale: Some(0.5),
            ..MapConfig::default()
        };
        assert_eq!(CoordinateTransform::scale_for(&config), 0.5);
    }

    #[test]
    fn test_first_sample_is_centered() {
        let transform = CoordinateTransform::centered_on((120.0, -40.0), 64, 64, 2.0);
        assert_eq!(transform.to_pixel(120.0, -40.0), (32, 32));
        assert_eq!(transform.to_pixel(125.0, -40.0), (42, 32));
        assert_eq!(transform.to_pixel(120.0, -45.0), (32, 22));
    }
}
