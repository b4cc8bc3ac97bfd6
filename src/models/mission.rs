use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::SampleQuality;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MissionPhase {
    Idle,
    Running,
    Paused,
    Returning,
    Docked,
    Completed,
    Error,
}

impl MissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionPhase::Idle => "Idle",
            MissionPhase::Running => "Running",
            MissionPhase::Paused => "Paused",
            MissionPhase::Returning => "Returning",
            MissionPhase::Docked => "Docked",
            MissionPhase::Completed => "Completed",
            MissionPhase::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionPhase::Completed | MissionPhase::Error)
    }

    /// Phases during which the robot is moving under its own mission and
    /// runtime accrues.
    pub fn accrues_runtime(&self) -> bool {
        matches!(self, MissionPhase::Running | MissionPhase::Returning)
    }

    pub fn accepts_poses(&self) -> bool {
        matches!(self, MissionPhase::Running | MissionPhase::Paused)
    }
}

impl Default for MissionPhase {
    fn default() -> Self {
        MissionPhase::Idle
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoseSample {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
    pub timestamp: DateTime<Utc>,
    pub quality: SampleQuality,
}

impl PoseSample {
    pub fn is_valid(&self) -> bool {
        self.quality == SampleQuality::Valid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub phase: MissionPhase,
    pub runtime_ms: u64,
    /// Square device units; `None` until a pose has been observed.
    pub area_estimate: Option<f64>,
    pub battery_min: Option<u8>,
    pub battery_max: Option<u8>,
    pub error_code: Option<u32>,
    pub reported_area_sqft: Option<u32>,
    pub reported_minutes: Option<u32>,
    pub poses: Vec<PoseSample>,
    /// Runtime accumulated in earlier running windows; combines with
    /// `running_anchor` to give the live runtime.
    #[serde(skip)]
    pub runtime_baseline_ms: u64,
    #[serde(skip)]
    pub running_anchor: Option<Instant>,
}

impl Mission {
    pub fn begin(id: String, started_at: DateTime<Utc>, now: Instant) -> Self {
        Self {
            id,
            started_at,
            ended_at: None,
            phase: MissionPhase::Running,
            runtime_ms: 0,
            area_estimate: None,
            battery_min: None,
            battery_max: None,
            error_code: None,
            reported_area_sqft: None,
            reported_minutes: None,
            poses: Vec::new(),
            runtime_baseline_ms: 0,
            running_anchor: Some(now),
        }
    }

    pub fn valid_pose_count(&self) -> usize {
        self.poses.iter().filter(|p| p.is_valid()).count()
    }

    pub fn runtime_at(&self, now: Instant) -> u64 {
        match self.running_anchor {
            Some(anchor) => self
                .runtime_baseline_ms
                .saturating_add(now.saturating_duration_since(anchor).as_millis() as u64),
            None => self.runtime_baseline_ms,
        }
    }

    pub fn sync_runtime(&mut self, now: Instant) {
        self.runtime_ms = self.runtime_at(now);
    }

    /// Stops the runtime clock, folding the open window into the baseline.
    pub fn halt_clock(&mut self, now: Instant) {
        self.sync_runtime(now);
        self.runtime_baseline_ms = self.runtime_ms;
        self.running_anchor = None;
    }

    /// Stops the clock at the runtime last synced, discarding the open window
    /// since then.
    pub fn freeze_clock(&mut self) {
        self.runtime_baseline_ms = self.runtime_ms;
        self.running_anchor = None;
    }

    pub fn resume_clock(&mut self, now: Instant) {
        if self.running_anchor.is_none() {
            self.running_anchor = Some(now);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissionPhaseChange {
    pub mission_id: String,
    pub from: MissionPhase,
    pub to: MissionPhase,
    pub at: DateTime<Utc>,
}
