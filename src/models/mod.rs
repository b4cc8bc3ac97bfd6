//! Canonical data model shared by every stage of the bridge.

pub mod event;
pub mod mission;
pub mod session;
pub mod telemetry;

pub use event::{
    Command, DeviceEvent, EventKind, EventPayload, MapArtifact, MapMetadata, RawEvent,
};
pub use mission::{Mission, MissionPhase, MissionPhaseChange, PoseSample};
pub use session::{ConnectionState, DeviceIdentity, RobotSession};
pub use telemetry::{DockStatus, PayloadShape, PhaseHint, RawPose, SampleQuality, TelemetrySample};
