//! Newline-delimited JSON frames exchanged with the robot.
//!
//! Outbound: `{"auth":{"blid":..,"password":..}}` once per connection, then
//! `{"command":"start","time":<unix secs>,"initiator":"localApp"}`.
//! Inbound: `{"auth":"ok"}` / `{"auth":"rejected","reason":..}` during the
//! handshake, then `{"event":"state"|"mission","payload":{..}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Command, DeviceIdentity, EventKind, RawEvent};

const COMMAND_INITIATOR: &str = "localApp";

#[derive(Serialize)]
struct AuthCredentials<'a> {
    blid: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: AuthCredentials<'a>,
}

#[derive(Serialize)]
struct CommandFrame {
    command: Command,
    time: i64,
    initiator: &'static str,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Ok,
    Rejected,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthReply {
    pub auth: AuthStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventFrame {
    pub event: EventKind,
    pub payload: serde_json::Value,
}

impl EventFrame {
    pub fn into_raw(self, received_at: DateTime<Utc>) -> RawEvent {
        RawEvent {
            kind: self.event,
            payload: self.payload,
            received_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InboundFrame {
    Auth(AuthReply),
    Event(EventFrame),
}

pub fn encode_auth(identity: &DeviceIdentity) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&AuthRequest {
        auth: AuthCredentials {
            blid: &identity.blid,
            password: &identity.password,
        },
    })
}

pub fn encode_command(command: Command, at: DateTime<Utc>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&CommandFrame {
        command,
        time: at.timestamp(),
        initiator: COMMAND_INITIATOR,
    })
}

pub fn decode(frame: &[u8]) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_slice(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_auth_request_shape() {
        let identity = DeviceIdentity {
            address: "10.0.0.2".into(),
            blid: "ABC".into(),
            password: "secret".into(),
        };
        let value: Value = serde_json::from_slice(&encode_auth(&identity).unwrap()).unwrap();
        assert_eq!(value, json!({"auth": {"blid": "ABC", "password": "secret"}}));
    }

    #[test]
    fn test_command_frame_shape() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let value: Value = serde_json::from_slice(&encode_command(Command::Dock, at).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"command": "dock", "time": 1_700_000_000, "initiator": "localApp"})
        );
    }

    #[test]
    fn test_decode_auth_replies() {
        assert_eq!(
            decode(br#"{"auth":"ok"}"#).unwrap(),
            InboundFrame::Auth(AuthReply {
                auth: AuthStatus::Ok,
                reason: None
            })
        );
        match decode(br#"{"auth":"rejected","reason":"bad password"}"#).unwrap() {
            InboundFrame::Auth(reply) => {
                assert_eq!(reply.auth, AuthStatus::Rejected);
                assert_eq!(reply.reason.as_deref(), Some("bad password"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_decode_event_frame() {
        let frame = decode(br#"{"event":"mission","payload":{"batPct":80}}"#).unwrap();
        let InboundFrame::Event(event) = frame else {
            panic!("expected event frame");
        };
        let raw = event.into_raw(Utc::now());
        assert_eq!(raw.kind, EventKind::Mission);
        assert_eq!(raw.payload["batPct"], 80);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not json").is_err());
        assert!(decode(br#"{"event":"unknown","payload":{}}"#).is_err());
        assert!(decode(br#"{"hello":1}"#).is_err());
    }
}
