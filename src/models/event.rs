use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::{ConnectionState, Mission, MissionPhaseChange, TelemetrySample};

/// Kind of inbound device event as keyed by the transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    State,
    Mission,
}

/// One inbound frame's payload, before normalization.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Dock,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Dock => "dock",
        }
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "dock" => Ok(Command::Dock),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapMetadata {
    pub width: u32,
    pub height: u32,
    /// Pixels per device unit.
    pub scale: f64,
    /// Device coordinate that maps to `origin_px`.
    pub origin: (f64, f64),
    pub origin_px: (f64, f64),
}

/// Finished raster of one mission's traveled path.
#[derive(Debug, Clone)]
pub struct MapArtifact {
    pub mission_id: String,
    pub metadata: MapMetadata,
    pub image: RgbImage,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    Connection(ConnectionState),
    Telemetry(TelemetrySample),
    MissionPhase(MissionPhaseChange),
    MissionFinished(Arc<Mission>),
    Map(Arc<MapArtifact>),
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::Connection(_) => "connection",
            EventPayload::Telemetry(_) => "telemetry",
            EventPayload::MissionPhase(_) => "mission-phase",
            EventPayload::MissionFinished(_) => "mission-finished",
            EventPayload::Map(_) => "map",
        }
    }
}

/// A canonical event tagged with its device and per-device sequence number.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub device_id: String,
    pub seq: u64,
    pub payload: EventPayload,
}
