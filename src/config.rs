use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::models::DeviceIdentity;

pub const CONFIG_ENV_VAR: &str = "ROOMBA_BRIDGE_CONFIG";
pub const DEBUG_ENV_VAR: &str = "ROOMBA_BRIDGE_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapConfig {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    /// Largest room span, in device units, the canvas must hold.
    pub max_room_extent: f64,
    /// Fixed pixels-per-unit; derived from `max_room_extent` when unset.
    pub scale: Option<f64>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 512,
            height: 512,
            max_room_extent: 1500.0,
            scale: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub address: String,
    pub blid: String,
    pub password: String,
    #[serde(default)]
    pub map: MapConfig,
}

impl DeviceConfig {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            address: self.address.clone(),
            blid: self.blid.clone(),
            password: self.password.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.blid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.blid.trim().is_empty() || self.password.is_empty() {
            bail!("device {} is missing blid or password", self.address);
        }
        if self.map.width == 0 || self.map.height == 0 {
            bail!("map canvas for {} must be non-empty", self.blid);
        }
        if !is_positive(self.map.max_room_extent) {
            bail!("maxRoomExtent for {} must be a positive number", self.blid);
        }
        if let Some(scale) = self.map.scale {
            if !is_positive(scale) {
                bail!("map scale for {} must be a positive number", self.blid);
            }
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub ceiling_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            ceiling_ms: 60_000,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SuspectPosePolicy {
    /// Suspect poses still add to the covered-area estimate.
    Count,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionConfig {
    /// Consecutive idle samples needed before an active mission completes.
    pub idle_confirm_samples: u32,
    /// Swath width in device units used for the coverage estimate.
    pub cleaning_width: f64,
    pub suspect_pose_policy: SuspectPosePolicy,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            idle_confirm_samples: 2,
            cleaning_width: 30.0,
            suspect_pose_policy: SuspectPosePolicy::Count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub devices: Vec<DeviceConfig>,
    pub liveness_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub backoff: BackoffConfig,
    pub mission: MissionConfig,
    /// Absolute device coordinate beyond which a pose is clamped and marked suspect.
    pub coordinate_bound: f64,
    pub event_queue_capacity: usize,
    pub map_output_dir: Option<PathBuf>,
    pub sink_retry_limit: u32,
    pub debug_frames: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            liveness_timeout_secs: 90,
            handshake_timeout_secs: 10,
            backoff: BackoffConfig::default(),
            mission: MissionConfig::default(),
            coordinate_bound: 10_000.0,
            event_queue_capacity: 256,
            map_output_dir: None,
            sink_retry_limit: 3,
            debug_frames: false,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let mut config: BridgeConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        let debug_mode = std::env::var(DEBUG_ENV_VAR)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config.debug_frames |= debug_mode;

        config.validate()?;
        Ok(config)
    }

    /// Resolves the config path from the first CLI argument after the program
    /// name, falling back to `ROOMBA_BRIDGE_CONFIG`.
    pub fn resolve_path(mut args: impl Iterator<Item = String>) -> Result<PathBuf> {
        if let Some(arg) = args.nth(1) {
            return Ok(PathBuf::from(arg));
        }
        std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .with_context(|| format!("no config path given and {CONFIG_ENV_VAR} is not set"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            bail!("at least one device must be configured");
        }
        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !seen.insert(device.blid.as_str()) {
                bail!("device {} configured more than once", device.blid);
            }
        }
        if !is_positive(self.coordinate_bound) {
            bail!("coordinateBound must be a positive number");
        }
        if !is_positive(self.mission.cleaning_width) {
            bail!("mission cleaningWidth must be a positive number");
        }
        if self.backoff.base_ms == 0 || self.backoff.base_ms > self.backoff.ceiling_ms {
            bail!(
                "backoff base ({}ms) must be non-zero and not exceed the ceiling ({}ms)",
                self.backoff.base_ms,
                self.backoff.ceiling_ms
            );
        }
        if self.liveness_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            bail!("timeouts must be non-zero");
        }
        if self.event_queue_capacity == 0 {
            bail!("eventQueueCapacity must be non-zero");
        }
        Ok(())
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"devices":[{{"address":"192.168.1.20","blid":"ABC","password":"secret"}}]}}"#
        )
        .unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].map.width, 512);
        assert!(config.devices[0].map.enabled);
        assert_eq!(config.backoff.base_ms, 1_000);
        assert_eq!(config.mission.suspect_pose_policy, SuspectPosePolicy::Count);
        assert_eq!(config.devices[0].display_name(), "ABC");
    }

    #[test]
    fn test_load_rejects_duplicate_devices() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"devices":[
                {{"address":"10.0.0.2","blid":"A","password":"p"}},
                {{"address":"10.0.0.3","blid":"A","password":"p"}}
            ]}}"#
        )
        .unwrap();

        assert!(BridgeConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = BridgeConfig::default();
        config.devices.push(DeviceConfig {
            name: None,
            address: "10.0.0.2".into(),
            blid: "A".into(),
            password: "p".into(),
            map: MapConfig::default(),
        });
        assert!(config.validate().is_ok());

        config.backoff.base_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_extents() {
        let mut device = DeviceConfig {
            name: None,
            address: "10.0.0.2".into(),
            blid: "A".into(),
            password: "p".into(),
            map: MapConfig::default(),
        };
        assert!(device.validate().is_ok());

        device.map.max_room_extent = f64::NAN;
        assert!(device.validate().is_err());
        device.map.max_room_extent = 100.0;
        device.map.scale = Some(f64::INFINITY);
        assert!(device.validate().is_err());

        device.map.scale = None;
        let mut config = BridgeConfig {
            devices: vec![device],
            ..BridgeConfig::default()
        };
        config.coordinate_bound = f64::NAN;
        assert!(config.validate().is_err());
        config.coordinate_bound = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_path_prefers_argument() {
        let args = vec!["roomba-bridge".to_string(), "/etc/bridge.json".to_string()];
        let path = BridgeConfig::resolve_path(args.into_iter()).unwrap();
        assert_eq!(path, PathBuf::from("/etc/bridge.json"));
    }
}
