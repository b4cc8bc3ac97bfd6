use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{json, Value};

use super::EventSink;
use crate::mapping::export;
use crate::models::{DeviceEvent, EventPayload};

/// JSON form of a canonical event. Map artifacts carry only their metadata;
/// finished missions drop the pose list in favor of its size.
pub fn event_json(event: &DeviceEvent) -> Result<Value> {
    let body = match &event.payload {
        EventPayload::Connection(state) => json!({ "state": state }),
        EventPayload::Telemetry(sample) => serde_json::to_value(sample)?,
        EventPayload::MissionPhase(change) => serde_json::to_value(change)?,
        EventPayload::MissionFinished(mission) => {
            let mut value = serde_json::to_value(mission.as_ref())?;
            if let Value::Object(fields) = &mut value {
                fields.remove("poses");
                fields.insert("poseCount".into(), json!(mission.poses.len()));
                fields.insert("validPoseCount".into(), json!(mission.valid_pose_count()));
            }
            value
        }
        EventPayload::Map(artifact) => json!({
            "missionId": artifact.mission_id,
            "map": artifact.metadata,
        }),
    };

    Ok(json!({
        "deviceId": event.device_id,
        "seq": event.seq,
        "type": event.payload.name(),
        "body": body,
    }))
}

/// Mirrors the event stream into the log.
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&mut self, event: &DeviceEvent) -> Result<()> {
        match &event.payload {
            EventPayload::Connection(state) => {
                info!("[{}] connection {}", event.device_id, state.as_str())
            }
            EventPayload::Telemetry(sample) => debug!(
                "[{}] telemetry battery={:?} phase={:?} quality={:?}",
                event.device_id, sample.battery_percent, sample.phase, sample.quality
            ),
            EventPayload::MissionPhase(change) => info!(
                "[{}] mission {} {} -> {}",
                event.device_id,
                change.mission_id,
                change.from.as_str(),
                change.to.as_str()
            ),
            EventPayload::MissionFinished(mission) => info!(
                "[{}] mission {} finished as {} after {} ms ({} poses, area {:?})",
                event.device_id,
                mission.id,
                mission.phase.as_str(),
                mission.runtime_ms,
                mission.poses.len(),
                mission.area_estimate
            ),
            EventPayload::Map(artifact) => info!(
                "[{}] map ready for mission {} ({}x{})",
                event.device_id, artifact.mission_id, artifact.metadata.width, artifact.metadata.height
            ),
        }
        Ok(())
    }
}

/// Writes each event as one JSON line.
pub struct JsonLinesSink<W: Write + Send + 'static> {
    out: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> EventSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn deliver(&mut self, event: &DeviceEvent) -> Result<()> {
        let line = serde_json::to_string(&event_json(event)?)?;
        writeln!(self.out, "{line}").context("failed to write event line")?;
        self.out.flush().context("failed to flush event line")?;
        Ok(())
    }
}

/// Persists every finished map as a PNG under `dir`.
pub struct MapDirectorySink {
    dir: PathBuf,
}

impl MapDirectorySink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl EventSink for MapDirectorySink {
    fn name(&self) -> &str {
        "map-directory"
    }

    fn deliver(&mut self, event: &DeviceEvent) -> Result<()> {
        if let EventPayload::Map(artifact) = &event.payload {
            let path = export::save_png(artifact, &event.device_id, &self.dir)?;
            info!("[{}] saved map to {}", event.device_id, path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionState, MapArtifact, MapMetadata, MissionPhase, MissionPhaseChange};
    use chrono::Utc;
    use std::sync::Arc;

    fn event(payload: EventPayload) -> DeviceEvent {
        DeviceEvent {
            device_id: "blid1".into(),
            seq: 7,
            payload,
        }
    }

    #[test]
    fn test_connection_event_json() {
        let value = event_json(&event(EventPayload::Connection(ConnectionState::Backoff))).unwrap();
        assert_eq!(value["type"], "connection");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["body"]["state"], "backoff");
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_event() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let change = MissionPhaseChange {
            mission_id: "m1".into(),
            from: MissionPhase::Running,
            to: MissionPhase::Paused,
            at: Utc::now(),
        };
        sink.deliver(&event(EventPayload::MissionPhase(change))).unwrap();
        sink.deliver(&event(EventPayload::Connection(ConnectionState::Connected)))
            .unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["body"]["to"], "paused");
    }

    #[test]
    fn test_map_directory_sink_ignores_other_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = MapDirectorySink::new(dir.path().join("maps"));
        sink.deliver(&event(EventPayload::Connection(ConnectionState::Connected)))
            .unwrap();
        assert!(!dir.path().join("maps").exists());

        let artifact = MapArtifact {
            mission_id: "m1".into(),
            metadata: MapMetadata {
                width: 4,
                height: 4,
                scale: 1.0,
                origin: (0.0, 0.0),
                origin_px: (2.0, 2.0),
            },
            image: image::RgbImage::new(4, 4),
        };
        sink.deliver(&event(EventPayload::Map(Arc::new(artifact)))).unwrap();
        assert!(dir.path().join("maps").join("blid1-m1.png").exists());
    }
}
