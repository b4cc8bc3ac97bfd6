use chrono::{DateTime, Utc};

use crate::error::NormalizeError;
use crate::models::{
    DockStatus, PhaseHint, RawEvent, RawPose, SampleQuality, TelemetrySample,
};

use super::shapes::{self, LegacyMissionFields, PoseReport, RawPayload, ReportedFields};

/// Layout-independent view of one payload, before validation.
#[derive(Debug, Default)]
struct Extracted<'a> {
    battery: Option<f64>,
    bin_full: Option<bool>,
    bin_present: Option<bool>,
    cycle: Option<&'a str>,
    phase: Option<&'a str>,
    error: Option<u32>,
    pose: Option<&'a PoseReport>,
    mission_minutes: Option<u32>,
    sqft: Option<u32>,
    utc_time: Option<i64>,
}

impl<'a> Extracted<'a> {
    fn from_reported(fields: &'a ReportedFields) -> Self {
        let mission = fields.mission.as_ref();
        Self {
            battery: fields.battery,
            bin_full: fields.bin.as_ref().and_then(|bin| bin.full),
            bin_present: fields.bin.as_ref().and_then(|bin| bin.present),
            cycle: mission.and_then(|m| m.cycle.as_deref()),
            phase: mission.and_then(|m| m.phase.as_deref()),
            error: mission.and_then(|m| m.error),
            pose: fields.pose.as_ref(),
            mission_minutes: mission.and_then(|m| m.mission_minutes),
            sqft: mission.and_then(|m| m.sqft),
            utc_time: fields.utc_time,
        }
    }

    fn from_legacy(fields: &'a LegacyMissionFields) -> Self {
        Self {
            battery: fields.battery,
            bin_full: fields.bin_full,
            bin_present: None,
            cycle: fields.cycle.as_deref(),
            phase: fields.phase.as_deref(),
            error: fields.error,
            pose: fields.pos.as_ref(),
            mission_minutes: fields.mission_minutes,
            sqft: fields.sqft,
            utc_time: None,
        }
    }

    fn is_meaningful(&self) -> bool {
        self.battery.is_some() || self.cycle.is_some() || self.phase.is_some() || self.pose.is_some()
    }
}

/// Stateless translation of raw device payloads into [`TelemetrySample`]s.
///
/// Only holds immutable configuration, so one instance can be shared by any
/// number of callers.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    coordinate_bound: f64,
}

impl Normalizer {
    pub fn new(coordinate_bound: f64) -> Self {
        Self {
            coordinate_bound: coordinate_bound.abs(),
        }
    }

    pub fn normalize(&self, raw: &RawEvent) -> Result<TelemetrySample, NormalizeError> {
        let payload = shapes::parse(&raw.payload)?;
        let extracted = match &payload {
            RawPayload::Shadow(fields) | RawPayload::Reported(fields) => {
                Extracted::from_reported(fields)
            }
            RawPayload::LegacyMission(fields) => Extracted::from_legacy(fields),
        };

        if !extracted.is_meaningful() {
            return Err(NormalizeError::UnrecognizedPayload(format!(
                "{:?} payload carries no battery, mission or pose data",
                payload.shape()
            )));
        }

        let mut quality = SampleQuality::Valid;

        let battery_percent = extracted.battery.map(|raw_pct| {
            let (pct, suspect) = clamp_battery(raw_pct);
            if suspect {
                quality = SampleQuality::Suspect;
            }
            pct
        });

        let pose = extracted.pose.and_then(|report| self.extract_pose(report));
        if pose.map_or(false, |p| p.quality.is_suspect()) {
            quality = SampleQuality::Suspect;
        }

        let phase = phase_hint(extracted.cycle, extracted.phase);

        Ok(TelemetrySample {
            battery_percent,
            bin_full: extracted.bin_full.unwrap_or(false),
            bin_present: extracted.bin_present,
            dock: dock_status(extracted.phase, phase),
            error_code: extracted.error.filter(|code| *code != 0),
            phase,
            pose,
            quality,
            shape: payload.shape(),
            mission_minutes: extracted.mission_minutes,
            reported_area_sqft: extracted.sqft,
            timestamp: device_timestamp(extracted.utc_time).unwrap_or(raw.received_at),
        })
    }

    fn extract_pose(&self, report: &PoseReport) -> Option<RawPose> {
        let point = report.point.as_ref()?;
        let (x, y) = (point.x?, point.y?);

        let (x, x_suspect) = clamp_coordinate(x, self.coordinate_bound);
        let (y, y_suspect) = clamp_coordinate(y, self.coordinate_bound);
        let (heading_deg, heading_suspect) = match report.theta {
            Some(theta) if theta.is_finite() => (wrap_heading(theta), false),
            Some(_) => (0.0, true),
            None => (0.0, false),
        };

        let quality = if x_suspect || y_suspect || heading_suspect {
            SampleQuality::Suspect
        } else {
            SampleQuality::Valid
        };

        Some(RawPose {
            x,
            y,
            heading_deg,
            quality,
        })
    }
}

fn clamp_battery(raw: f64) -> (u8, bool) {
    if !raw.is_finite() {
        return (0, true);
    }
    let suspect = !(0.0..=100.0).contains(&raw);
    (raw.round().clamp(0.0, 100.0) as u8, suspect)
}

fn clamp_coordinate(value: f64, bound: f64) -> (f64, bool) {
    if !value.is_finite() {
        return (0.0, true);
    }
    if value.abs() > bound {
        return (value.clamp(-bound, bound), true);
    }
    (value, false)
}

/// Wraps a heading into (-180, 180].
fn wrap_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

pub fn phase_hint(cycle: Option<&str>, phase: Option<&str>) -> PhaseHint {
    if cycle == Some("none") {
        return PhaseHint::Idle;
    }

    match phase {
        Some("run" | "new" | "resume") => PhaseHint::Run,
        Some("pause" | "stop") => PhaseHint::Pause,
        Some("hmUsrDock" | "hmMidMsn" | "hmPostMsn") => PhaseHint::Returning,
        Some("charge") if cycle.is_none() => PhaseHint::Idle,
        Some("charge" | "recharge" | "evac" | "dockend") => PhaseHint::Docked,
        Some("stuck") => PhaseHint::Stuck,
        _ => PhaseHint::Unknown,
    }
}

fn dock_status(raw_phase: Option<&str>, hint: PhaseHint) -> DockStatus {
    match raw_phase {
        Some("charge" | "recharge" | "evac" | "dockend") => DockStatus::Docked,
        _ => match hint {
            PhaseHint::Run | PhaseHint::Pause | PhaseHint::Returning | PhaseHint::Stuck => {
                DockStatus::Undocked
            }
            _ => DockStatus::Unknown,
        },
    }
}

fn device_timestamp(utc_time: Option<i64>) -> Option<DateTime<Utc>> {
    utc_time
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, PayloadShape};
    use serde_json::{json, Value};

    fn raw(payload: Value) -> RawEvent {
        RawEvent {
            kind: EventKind::State,
            payload,
            received_at: Utc::now(),
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(10_000.0)
    }

    #[test]
    fn test_shadow_payload_full() {
        let sample = normalizer()
            .normalize(&raw(json!({"state": {"reported": {
                "batPct": 87,
                "bin": {"present": true, "full": false},
                "cleanMissionStatus": {"cycle": "clean", "phase": "run", "error": 0, "mssnM": 4, "sqft": 12},
                "pose": {"theta": 90, "point": {"x": 12, "y": -30}},
                "utcTime": 1_700_000_000,
                "signal": {"rssi": -41}
            }}})))
            .unwrap();

        assert_eq!(sample.shape, PayloadShape::Shadow);
        assert_eq!(sample.battery_percent, Some(87));
        assert_eq!(sample.phase, PhaseHint::Run);
        assert_eq!(sample.dock, DockStatus::Undocked);
        assert_eq!(sample.error_code, None);
        assert_eq!(sample.mission_minutes, Some(4));
        assert_eq!(sample.reported_area_sqft, Some(12));
        assert_eq!(sample.quality, SampleQuality::Valid);
        assert_eq!(sample.timestamp.timestamp(), 1_700_000_000);

        let pose = sample.pose.unwrap();
        assert_eq!((pose.x, pose.y, pose.heading_deg), (12.0, -30.0, 90.0));
        assert_eq!(pose.quality, SampleQuality::Valid);
    }

    #[test]
    fn test_missing_pose_is_not_a_failure() {
        let payloads = [
            json!({"state": {"reported": {"batPct": 50, "cleanMissionStatus": {"cycle": "clean", "phase": "run"}}}}),
            json!({"batPct": 50}),
            json!({"ok": {"cycle": "clean", "phase": "run", "batPct": 50}}),
            json!({"state": {"reported": {"batPct": 50, "pose": {"theta": 10}}}}),
        ];

        for payload in payloads {
            let sample = normalizer().normalize(&raw(payload)).unwrap();
            assert!(sample.pose.is_none());
        }
    }

    #[test]
    fn test_legacy_mission_payload() {
        let sample = normalizer()
            .normalize(&raw(json!({"ok": {
                "cycle": "clean", "phase": "hmPostMsn", "error": 0, "batPct": 40,
                "binFull": true, "pos": {"theta": -90, "point": {"x": 5, "y": 6}}
            }})))
            .unwrap();

        assert_eq!(sample.shape, PayloadShape::LegacyMission);
        assert_eq!(sample.phase, PhaseHint::Returning);
        assert!(sample.bin_full);
        assert_eq!(sample.pose.unwrap().heading_deg, -90.0);
    }

    #[test]
    fn test_battery_out_of_range_is_clamped_and_suspect() {
        let high = normalizer().normalize(&raw(json!({"batPct": 130}))).unwrap();
        assert_eq!(high.battery_percent, Some(100));
        assert_eq!(high.quality, SampleQuality::Suspect);

        let low = normalizer().normalize(&raw(json!({"batPct": -4}))).unwrap();
        assert_eq!(low.battery_percent, Some(0));
        assert_eq!(low.quality, SampleQuality::Suspect);
    }

    #[test]
    fn test_coordinates_out_of_bound_are_clamped() {
        let sample = normalizer()
            .normalize(&raw(json!({"pose": {"theta": 370, "point": {"x": 25_000, "y": -3}}})))
            .unwrap();
        let pose = sample.pose.unwrap();
        assert_eq!(pose.x, 10_000.0);
        assert_eq!(pose.y, -3.0);
        assert_eq!(pose.heading_deg, 10.0);
        assert_eq!(pose.quality, SampleQuality::Suspect);
        assert_eq!(sample.quality, SampleQuality::Suspect);
    }

    #[test]
    fn test_error_code_propagates() {
        let sample = normalizer()
            .normalize(&raw(json!({"cleanMissionStatus": {"cycle": "clean", "phase": "stuck", "error": 17}})))
            .unwrap();
        assert_eq!(sample.error_code, Some(17));
        assert_eq!(sample.phase, PhaseHint::Stuck);
    }

    #[test]
    fn test_irrelevant_payload_is_unrecognized() {
        let result = normalizer().normalize(&raw(json!({"state": {"reported": {"signal": {"rssi": -50}}}})));
        assert!(matches!(result, Err(NormalizeError::UnrecognizedPayload(_))));

        let result = normalizer().normalize(&raw(json!("garbage")));
        assert!(matches!(result, Err(NormalizeError::UnrecognizedPayload(_))));
    }

    #[test]
    fn test_phase_hint_mapping() {
        assert_eq!(phase_hint(Some("none"), Some("run")), PhaseHint::Idle);
        assert_eq!(phase_hint(Some("none"), Some("charge")), PhaseHint::Idle);
        assert_eq!(phase_hint(None, Some("charge")), PhaseHint::Idle);
        assert_eq!(phase_hint(Some("clean"), Some("charge")), PhaseHint::Docked);
        assert_eq!(phase_hint(Some("clean"), Some("recharge")), PhaseHint::Docked);
        assert_eq!(phase_hint(Some("spot"), Some("resume")), PhaseHint::Run);
        assert_eq!(phase_hint(Some("clean"), Some("stop")), PhaseHint::Pause);
        assert_eq!(phase_hint(Some("clean"), Some("hmUsrDock")), PhaseHint::Returning);
        assert_eq!(phase_hint(Some("clean"), Some("wat")), PhaseHint::Unknown);
        assert_eq!(phase_hint(None, None), PhaseHint::Unknown);
    }

    #[test]
    fn test_heading_wrap() {
        assert_eq!(wrap_heading(180.0), 180.0);
        assert_eq!(wrap_heading(-180.0), 180.0);
        assert_eq!(wrap_heading(270.0), -90.0);
        assert_eq!(wrap_heading(-30.0), -30.0);
    }
}
