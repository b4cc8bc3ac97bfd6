//! Canonical, generation-independent telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SampleQuality {
    Valid,
    Suspect,
}

impl SampleQuality {
    pub fn is_suspect(&self) -> bool {
        *self == SampleQuality::Suspect
    }
}

impl Default for SampleQuality {
    fn default() -> Self {
        SampleQuality::Valid
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DockStatus {
    Docked,
    Undocked,
    Unknown,
}

/// Coarse reading of what the device says it is doing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhaseHint {
    Idle,
    Run,
    Pause,
    Returning,
    Docked,
    Stuck,
    Unknown,
}

/// Which payload layout the sample was extracted from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PayloadShape {
    Shadow,
    Reported,
    LegacyMission,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPose {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub quality: SampleQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub battery_percent: Option<u8>,
    pub bin_full: bool,
    pub bin_present: Option<bool>,
    pub dock: DockStatus,
    /// Device fault code; `None` when the device reports no error.
    pub error_code: Option<u32>,
    pub phase: PhaseHint,
    pub pose: Option<RawPose>,
    /// `Suspect` when any numeric field had to be clamped.
    pub quality: SampleQuality,
    pub shape: PayloadShape,
    pub mission_minutes: Option<u32>,
    pub reported_area_sqft: Option<u32>,
    pub timestamp: DateTime<Utc>,
}
