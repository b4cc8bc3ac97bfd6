use crate::config::SuspectPosePolicy;
use crate::models::{Mission, PoseSample, TelemetrySample};

/// Coarse swept-area bookkeeping from consecutive pose displacements.
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    cleaning_width: f64,
    policy: SuspectPosePolicy,
    last_point: Option<(f64, f64)>,
}

impl CoverageTracker {
    pub fn new(cleaning_width: f64, policy: SuspectPosePolicy) -> Self {
        Self {
            cleaning_width: cleaning_width.max(0.0),
            policy,
            last_point: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_point = None;
    }

    /// Returns the area swept since the previous counted pose.
    pub fn advance(&mut self, pose: &PoseSample) -> Option<f64> {
        if !pose.is_valid() && self.policy == SuspectPosePolicy::Ignore {
            return None;
        }

        let point = (pose.x, pose.y);
        let swept = match self.last_point {
            Some((x, y)) => (point.0 - x).hypot(point.1 - y) * self.cleaning_width,
            None => 0.0,
        };
        self.last_point = Some(point);
        Some(swept)
    }
}

pub fn record_battery(mission: &mut Mission, sample: &TelemetrySample) {
    if let Some(pct) = sample.battery_percent {
        mission.battery_min = Some(mission.battery_min.map_or(pct, |min| min.min(pct)));
        mission.battery_max = Some(mission.battery_max.map_or(pct, |max| max.max(pct)));
    }
}

pub fn record_device_counters(mission: &mut Mission, sample: &TelemetrySample) {
    if sample.mission_minutes.is_some() {
        mission.reported_minutes = sample.mission_minutes;
    }
    if sample.reported_area_sqft.is_some() {
        mission.reported_area_sqft = sample.reported_area_sqft;
    }
}
