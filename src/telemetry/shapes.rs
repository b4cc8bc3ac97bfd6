//! Raw payload layouts emitted by the different device generations.
//!
//! Every layout is deserialized into its own typed struct after
//! [`detect_shape`] has picked it, so a payload is never probed field by
//! field across layouts.

use serde::Deserialize;
use serde_json::Value;

use crate::error::NormalizeError;
use crate::models::PayloadShape;

/// Top-level keys that identify an unwrapped delta report.
const REPORTED_KEYS: [&str; 5] = ["batPct", "bin", "cleanMissionStatus", "pose", "dock"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BinReport {
    pub present: Option<bool>,
    pub full: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockReport {
    pub known: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointReport {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoseReport {
    pub theta: Option<f64>,
    pub point: Option<PointReport>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionStatusReport {
    pub cycle: Option<String>,
    pub phase: Option<String>,
    pub error: Option<u32>,
    #[serde(rename = "mssnM")]
    pub mission_minutes: Option<u32>,
    pub sqft: Option<u32>,
}

/// Fields of the current firmware's reported state document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportedFields {
    #[serde(rename = "batPct")]
    pub battery: Option<f64>,
    pub bin: Option<BinReport>,
    #[serde(rename = "cleanMissionStatus")]
    pub mission: Option<MissionStatusReport>,
    pub pose: Option<PoseReport>,
    pub dock: Option<DockReport>,
    #[serde(rename = "utcTime")]
    pub utc_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShadowState {
    reported: ReportedFields,
}

#[derive(Debug, Clone, Deserialize)]
struct ShadowEnvelope {
    state: ShadowState,
}

/// Mission poll response of older firmware: mission status flattened next to
/// battery and position.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyMissionFields {
    pub cycle: Option<String>,
    pub phase: Option<String>,
    pub error: Option<u32>,
    #[serde(rename = "batPct")]
    pub battery: Option<f64>,
    pub pos: Option<PoseReport>,
    #[serde(rename = "binFull")]
    pub bin_full: Option<bool>,
    #[serde(rename = "mssnM")]
    pub mission_minutes: Option<u32>,
    pub sqft: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacyEnvelope {
    ok: LegacyMissionFields,
}

#[derive(Debug, Clone)]
pub enum RawPayload {
    Shadow(ReportedFields),
    Reported(ReportedFields),
    LegacyMission(LegacyMissionFields),
}

impl RawPayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            RawPayload::Shadow(_) => PayloadShape::Shadow,
            RawPayload::Reported(_) => PayloadShape::Reported,
            RawPayload::LegacyMission(_) => PayloadShape::LegacyMission,
        }
    }
}

pub fn detect_shape(value: &Value) -> Option<PayloadShape> {
    let object = value.as_object()?;

    let has_reported = object
        .get("state")
        .and_then(|state| state.get("reported"))
        .map_or(false, Value::is_object);
    if has_reported {
        return Some(PayloadShape::Shadow);
    }

    if object.get("ok").map_or(false, Value::is_object) {
        return Some(PayloadShape::LegacyMission);
    }

    if REPORTED_KEYS.iter().any(|key| object.contains_key(*key)) {
        return Some(PayloadShape::Reported);
    }

    None
}

pub fn parse(value: &Value) -> Result<RawPayload, NormalizeError> {
    let shape = detect_shape(value)
        .ok_or_else(|| NormalizeError::UnrecognizedPayload("no known payload layout".into()))?;

    let malformed = |err: serde_json::Error| {
        NormalizeError::UnrecognizedPayload(format!("malformed {shape:?} payload: {err}"))
    };

    let payload = match shape {
        PayloadShape::Shadow => {
            let envelope = ShadowEnvelope::deserialize(value).map_err(malformed)?;
            RawPayload::Shadow(envelope.state.reported)
        }
        PayloadShape::LegacyMission => {
            let envelope = LegacyEnvelope::deserialize(value).map_err(malformed)?;
            RawPayload::LegacyMission(envelope.ok)
        }
        PayloadShape::Reported => {
            RawPayload::Reported(ReportedFields::deserialize(value).map_err(malformed)?)
        }
    };

    Ok(payload)
}
