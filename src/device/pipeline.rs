use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::{BridgeConfig, MapConfig};
use crate::dispatch::Dispatcher;
use crate::mapping::MapEngine;
use crate::mission::MissionMachine;
use crate::models::{EventPayload, Mission, RawEvent};
use crate::telemetry::Normalizer;

/// Per-device processing: raw event -> telemetry sample -> mission state ->
/// map, publishing every canonical event on the way.
pub struct DevicePipeline {
    device_id: String,
    normalizer: Normalizer,
    missions: MissionMachine,
    map_config: MapConfig,
    map: Option<MapEngine>,
    dispatcher: Dispatcher,
}

impl DevicePipeline {
    pub fn new(
        device_id: String,
        config: &BridgeConfig,
        map_config: MapConfig,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            device_id,
            normalizer: Normalizer::new(config.coordinate_bound),
            missions: MissionMachine::new(config.mission.clone()),
            map_config,
            map: None,
            dispatcher,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn active_mission(&self) -> Option<&Mission> {
        self.missions.active()
    }

    pub fn map(&self) -> Option<&MapEngine> {
        self.map.as_ref()
    }

    /// Processes one raw event. An unusable payload is dropped here and never
    /// reaches the mission or map state.
    pub fn handle(&mut self, raw: &RawEvent, now: Instant) {
        let sample = match self.normalizer.normalize(raw) {
            Ok(sample) => sample,
            Err(err) => {
                debug!("[{}] dropping {:?} event: {err}", self.device_id, raw.kind);
                return;
            }
        };
        if sample.quality.is_suspect() {
            debug!("[{}] suspect sample accepted with flag", self.device_id);
        }

        self.dispatcher
            .publish(&self.device_id, EventPayload::Telemetry(sample.clone()));

        let update = self.missions.observe(&sample, now);

        if let Some(mission_id) = &update.started {
            if self.map.take().is_some() {
                warn!("[{}] discarding map of an unfinished mission", self.device_id);
            }
            if self.map_config.enabled {
                self.map = Some(MapEngine::new(mission_id.clone(), &self.map_config));
            }
        }

        if let (Some(pose), Some(map)) = (update.pose.as_ref(), self.map.as_mut()) {
            map.ingest(pose);
        }

        for change in update.changes {
            self.dispatcher
                .publish(&self.device_id, EventPayload::MissionPhase(change));
        }

        if let Some(mission) = update.finished {
            self.finish_map(&mission);
            self.dispatcher
                .publish(&self.device_id, EventPayload::MissionFinished(Arc::new(mission)));
        }
    }

    fn finish_map(&mut self, mission: &Mission) {
        let Some(engine) = self.map.take() else {
            return;
        };
        if engine.mission_id() != mission.id {
            warn!(
                "[{}] map belongs to mission {}, not {}",
                self.device_id,
                engine.mission_id(),
                mission.id
            );
            return;
        }

        match engine.finish() {
            Some(artifact) => {
                info!("[{}] map for mission {} complete", self.device_id, mission.id);
                self.dispatcher
                    .publish(&self.device_id, EventPayload::Map(Arc::new(artifact)));
            }
            None => info!(
                "[{}] mission {} produced no valid pose; no map",
                self.device_id, mission.id
            ),
        }
    }
}
