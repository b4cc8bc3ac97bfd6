use log::debug;

use crate::config::MapConfig;
use crate::models::{MapArtifact, PoseSample};

use super::line::PixelCoord;
use super::raster::{DirtyRegion, MapRaster, HEADING_MARKER, PATH, START_MARKER};
use super::transform::CoordinateTransform;

const START_MARKER_RADIUS: i64 = 1;
const HEADING_MARKER_LEN: f64 = 4.0;

/// Rasterizes the pose stream of one mission.
///
/// The first valid pose fixes the coordinate transform for the rest of the
/// mission. A suspect pose lifts the pen: the next valid pose starts a new
/// stroke instead of connecting across the gap.
pub struct MapEngine {
    mission_id: String,
    scale: f64,
    raster: MapRaster,
    last_px: Option<PixelCoord>,
    start_px: Option<PixelCoord>,
    pen_lifted: bool,
    last_heading_deg: f64,
    valid_poses: usize,
}

impl MapEngine {
    pub fn new(mission_id: String, config: &MapConfig) -> Self {
        Self {
            mission_id,
            scale: CoordinateTransform::scale_for(config),
            raster: MapRaster::new(config.width, config.height),
            last_px: None,
            start_px: None,
            pen_lifted: false,
            last_heading_deg: 0.0,
            valid_poses: 0,
        }
    }

    pub fn mission_id(&self) -> &str {
        &self.mission_id
    }

    pub fn raster(&self) -> &MapRaster {
        &self.raster
    }

    pub fn ingest(&mut self, pose: &PoseSample) {
        if !pose.is_valid() {
            if self.last_px.is_some() {
                self.pen_lifted = true;
            }
            return;
        }

        let scale = self.scale;
        let transform = self
            .raster
            .establish_transform(|w, h| CoordinateTransform::centered_on((pose.x, pose.y), w, h, scale));
        let (x, y) = self.raster.clip(transform.to_pixel(pose.x, pose.y));
        let px = (i64::from(x), i64::from(y));

        match self.last_px {
            None => {
                self.raster.draw_marker(px, START_MARKER_RADIUS, START_MARKER);
                self.start_px = Some(px);
            }
            Some(prev) if !self.pen_lifted => self.raster.draw_line(prev, px, PATH),
            Some(_) => {
                debug!("map {}: skipping segment across suspect pose", self.mission_id);
                self.raster.paint(px, PATH);
            }
        }

        self.last_px = Some(px);
        self.pen_lifted = false;
        self.last_heading_deg = pose.heading_deg;
        self.valid_poses += 1;
    }

    pub fn take_dirty(&mut self) -> Option<DirtyRegion> {
        self.raster.take_dirty()
    }

    /// Consumes the engine; `None` when the mission never produced a valid pose.
    pub fn finish(mut self) -> Option<MapArtifact> {
        let transform = *self.raster.transform()?;
        let start = self.start_px?;

        if self.valid_poses > 1 {
            if let Some(last) = self.last_px {
                let radians = self.last_heading_deg.to_radians();
                let tip = (
                    last.0 + (radians.cos() * HEADING_MARKER_LEN).round() as i64,
                    last.1 + (radians.sin() * HEADING_MARKER_LEN).round() as i64,
                );
                self.raster.draw_line(last, tip, HEADING_MARKER);
            }
        }
        // Keep the start visible where the path crossed it.
        self.raster.draw_marker(start, START_MARKER_RADIUS, START_MARKER);

        let (width, height) = (self.raster.width(), self.raster.height());
        Some(MapArtifact {
            mission_id: self.mission_id,
            metadata: transform.metadata(width, height),
            image: self.raster.into_image(),
        })
    }
}
