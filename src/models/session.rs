use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Backoff,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Authenticating => "Authenticating",
            ConnectionState::Connected => "Connected",
            ConnectionState::Backoff => "Backoff",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

/// Local credentials and address of one robot.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub address: String,
    pub blid: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("address", &self.address)
            .field("blid", &self.blid)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotSession {
    pub identity: DeviceIdentity,
    pub state: ConnectionState,
    /// Consecutive failed connection attempts since the last `Connected`.
    pub retry_count: u32,
    pub last_seen: Option<DateTime<Utc>>,
    /// Set once the device rejected the credentials; the session stays
    /// `Disconnected` until it is reconfigured.
    pub auth_rejected: bool,
}

impl RobotSession {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            state: ConnectionState::Disconnected,
            retry_count: 0,
            last_seen: None,
            auth_rejected: false,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.identity.blid
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
