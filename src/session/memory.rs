//! In-process transport where the caller plays the robot. Each
//! [`MemoryConnector::accept_next`] or [`MemoryConnector::refuse_next`] queues
//! the outcome of one future connection attempt; attempts beyond the queue
//! are refused.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use super::transport::{Connector, FrameReader, FrameWriter};
use crate::error::SessionError;

const CHANNEL_CAPACITY: usize = 64;

enum Attempt {
    Accept(MemoryFrameReader, MemoryFrameWriter),
    Refuse(String),
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    attempts: Arc<Mutex<VecDeque<Attempt>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug)]
pub struct MemoryFrameReader {
    rx: mpsc::Receiver<Vec<u8>>,
}

#[derive(Debug)]
pub struct MemoryFrameWriter {
    tx: mpsc::Sender<Vec<u8>>,
}

/// Robot side of an accepted connection. Dropping it closes the connection.
pub struct MemoryDevice {
    to_bridge: mpsc::Sender<Vec<u8>>,
    from_bridge: mpsc::Receiver<Vec<u8>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, attempt: Attempt) {
        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        attempts.push_back(attempt);
    }

    pub fn accept_next(&self) -> MemoryDevice {
        let (to_bridge, bridge_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (bridge_tx, from_bridge) = mpsc::channel(CHANNEL_CAPACITY);
        self.push(Attempt::Accept(
            MemoryFrameReader { rx: bridge_rx },
            MemoryFrameWriter { tx: bridge_tx },
        ));
        MemoryDevice {
            to_bridge,
            from_bridge,
        }
    }

    pub fn refuse_next(&self, reason: &str) {
        self.push(Attempt::Refuse(reason.to_string()));
    }

    /// Addresses of every connection attempt so far, refused ones included.
    pub fn attempts(&self) -> Vec<String> {
        match self.opened.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn next_attempt(&self, address: &str) -> Option<Attempt> {
        match self.opened.lock() {
            Ok(mut guard) => guard.push(address.to_string()),
            Err(poisoned) => poisoned.into_inner().push(address.to_string()),
        }
        match self.attempts.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

impl Connector for MemoryConnector {
    type Reader = MemoryFrameReader;
    type Writer = MemoryFrameWriter;

    fn open(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<(Self::Reader, Self::Writer), SessionError>> + Send {
        let attempt = self.next_attempt(address);
        let address = address.to_string();
        async move {
            match attempt {
                Some(Attempt::Accept(reader, writer)) => Ok((reader, writer)),
                Some(Attempt::Refuse(reason)) => Err(SessionError::Transport(reason)),
                None => Err(SessionError::Transport(format!("{address} unreachable"))),
            }
        }
    }
}

impl FrameReader for MemoryFrameReader {
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, SessionError>> + Send {
        async move { Ok(self.rx.recv().await) }
    }
}

impl FrameWriter for MemoryFrameWriter {
    fn write_frame(&mut self, frame: &[u8]) -> impl Future<Output = Result<(), SessionError>> + Send {
        let frame = frame.to_vec();
        async move {
            self.tx
                .send(frame)
                .await
                .map_err(|_| SessionError::Transport("peer closed the connection".into()))
        }
    }
}

impl MemoryDevice {
    /// Sends one frame to the bridge; `false` once the bridge hung up.
    pub async fn send_json(&self, value: Value) -> bool {
        match serde_json::to_vec(&value) {
            Ok(frame) => self.send_raw(frame).await,
            Err(_) => false,
        }
    }

    pub async fn send_raw(&self, frame: Vec<u8>) -> bool {
        self.to_bridge.send(frame).await.is_ok()
    }

    pub async fn accept_auth(&self) -> bool {
        self.send_json(serde_json::json!({"auth": "ok"})).await
    }

    pub async fn reject_auth(&self, reason: &str) -> bool {
        self.send_json(serde_json::json!({"auth": "rejected", "reason": reason}))
            .await
    }

    /// Next frame written by the bridge, parsed as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let frame = self.from_bridge.recv().await?;
        serde_json::from_slice(&frame).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_attempts_follow_queue_order() {
        let connector = MemoryConnector::new();
        connector.refuse_next("boom");
        let mut device = connector.accept_next();

        assert!(connector.open("robot").await.is_err());
        let (mut reader, mut writer) = connector.open("robot").await.unwrap();
        assert!(connector.open("robot").await.is_err());
        assert_eq!(connector.attempts().len(), 3);

        writer.write_frame(br#"{"x":1}"#).await.unwrap();
        assert_eq!(device.recv_json().await, Some(json!({"x": 1})));

        assert!(device.send_json(json!({"y": 2})).await);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), br#"{"y":2}"#);

        drop(device);
        assert_eq!(reader.next_frame().await.unwrap(), None);
        assert!(writer.write_frame(b"{}").await.is_err());
    }
}
