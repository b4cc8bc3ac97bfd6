use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::protocol::{self, AuthStatus, InboundFrame};
use super::transport::{Connector, FrameReader, FrameWriter};
use crate::dispatch::Dispatcher;
use crate::error::SessionError;
use crate::models::{Command, ConnectionState, DeviceIdentity, EventPayload, RawEvent, RobotSession};
use crate::trace_frame;

/// Shared view of one robot's session: connection state plus the write half
/// used for commands.
pub struct SessionHandle<W> {
    session: Arc<Mutex<RobotSession>>,
    writer: Arc<Mutex<Option<W>>>,
    dispatcher: Dispatcher,
}

impl<W> Clone for SessionHandle<W> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            writer: self.writer.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<W: FrameWriter> SessionHandle<W> {
    fn new(identity: DeviceIdentity, dispatcher: Dispatcher) -> Self {
        Self {
            session: Arc::new(Mutex::new(RobotSession::new(identity))),
            writer: Arc::new(Mutex::new(None)),
            dispatcher,
        }
    }

    pub async fn snapshot(&self) -> RobotSession {
        self.session.lock().await.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state
    }

    async fn set_state(&self, next: ConnectionState) {
        let mut session = self.session.lock().await;
        if session.state == next {
            return;
        }
        debug!(
            "[{}] {} -> {}",
            session.device_id(),
            session.state.as_str(),
            next.as_str()
        );
        session.state = next;
        self.dispatcher
            .publish(session.device_id(), EventPayload::Connection(next));
    }

    /// Sends a control command over the live connection. Fails with
    /// `NotConnected` without touching the session when the link is down.
    pub async fn send_command(&self, command: Command) -> Result<(), SessionError> {
        let device_id = {
            let session = self.session.lock().await;
            if session.state != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }
            session.device_id().to_string()
        };

        let frame = protocol::encode_command(command, Utc::now()).map_err(SessionError::transport)?;
        let mut writer = self.writer.lock().await;
        let Some(link) = writer.as_mut() else {
            return Err(SessionError::NotConnected);
        };

        trace_frame!(device_id, "->", &frame);
        match link.write_frame(&frame).await {
            Ok(()) => {
                info!("[{device_id}] sent {} command", command.as_str());
                Ok(())
            }
            Err(err) => {
                warn!("[{device_id}] {} command failed: {err}", command.as_str());
                *writer = None;
                Err(err)
            }
        }
    }
}

enum PumpEnd {
    Cancelled,
    ConsumerGone,
    Lost(SessionError),
}

/// Owns the connection lifecycle of one robot:
/// `Disconnected -> Connecting -> Authenticating -> Connected`, with
/// `Backoff` between failed attempts. A credential rejection is terminal
/// until [`SessionManager::reconfigure`].
pub struct SessionManager<C: Connector> {
    connector: C,
    handle: SessionHandle<C::Writer>,
    handshake_timeout: Duration,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(
        connector: C,
        identity: DeviceIdentity,
        handshake_timeout: Duration,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            connector,
            handle: SessionHandle::new(identity, dispatcher),
            handshake_timeout,
        }
    }

    pub fn handle(&self) -> SessionHandle<C::Writer> {
        self.handle.clone()
    }

    /// Swaps in new credentials and clears a previous rejection.
    pub async fn reconfigure(&self, identity: DeviceIdentity) {
        let mut session = self.handle.session.lock().await;
        session.identity = identity;
        session.auth_rejected = false;
        session.retry_count = 0;
    }

    /// One connection attempt including the auth handshake. On success the
    /// session is `Connected` and the returned reader carries device events.
    pub async fn connect(&self) -> Result<C::Reader, SessionError> {
        let identity = {
            let session = self.handle.session.lock().await;
            if session.auth_rejected {
                return Err(SessionError::Auth(
                    "credentials were rejected; reconfigure the device".into(),
                ));
            }
            session.identity.clone()
        };

        self.handle.set_state(ConnectionState::Connecting).await;
        let attempt = tokio::time::timeout(self.handshake_timeout, self.handshake(&identity)).await;
        let result = attempt.unwrap_or_else(|_| {
            Err(SessionError::Transport(format!(
                "handshake timed out after {:?}",
                self.handshake_timeout
            )))
        });

        match result {
            Ok((reader, writer)) => {
                *self.handle.writer.lock().await = Some(writer);
                {
                    let mut session = self.handle.session.lock().await;
                    session.retry_count = 0;
                    session.last_seen = Some(Utc::now());
                }
                self.handle.set_state(ConnectionState::Connected).await;
                info!("[{}] connected to {}", identity.blid, identity.address);
                Ok(reader)
            }
            Err(err @ SessionError::Auth(_)) => {
                self.handle.session.lock().await.auth_rejected = true;
                self.handle.set_state(ConnectionState::Disconnected).await;
                Err(err)
            }
            Err(err) => {
                self.handle.session.lock().await.retry_count += 1;
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<(C::Reader, C::Writer), SessionError> {
        let (mut reader, mut writer) = self.connector.open(&identity.address).await?;
        self.handle.set_state(ConnectionState::Authenticating).await;

        let request = protocol::encode_auth(identity).map_err(SessionError::transport)?;
        writer.write_frame(&request).await?;

        loop {
            let Some(frame) = reader.next_frame().await? else {
                return Err(SessionError::Transport("closed during handshake".into()));
            };
            trace_frame!(identity.blid, "<-", &frame);
            match protocol::decode(&frame) {
                Ok(InboundFrame::Auth(reply)) => {
                    return match reply.auth {
                        AuthStatus::Ok => Ok((reader, writer)),
                        AuthStatus::Rejected => Err(SessionError::Auth(
                            reply.reason.unwrap_or_else(|| "rejected".into()),
                        )),
                    };
                }
                Ok(InboundFrame::Event(_)) => {
                    debug!("[{}] event before auth reply, ignoring", identity.blid)
                }
                Err(err) => debug!("[{}] undecodable handshake frame: {err}", identity.blid),
            }
        }
    }

    async fn disconnect(&self) {
        self.handle.writer.lock().await.take();
    }

    /// Keeps the robot connected until cancelled, forwarding every device
    /// event to `events`. Returns `Err` only for a credential rejection.
    pub async fn run(
        self,
        events: mpsc::Sender<RawEvent>,
        mut backoff: Backoff,
        liveness_timeout: Duration,
        cancel_token: CancellationToken,
    ) -> Result<(), SessionError> {
        let outcome = loop {
            let attempt = tokio::select! {
                result = self.connect() => result,
                _ = cancel_token.cancelled() => break Ok(()),
            };

            match attempt {
                Ok(reader) => {
                    backoff.reset();
                    let end = self.pump(reader, &events, liveness_timeout, &cancel_token).await;
                    self.disconnect().await;
                    match end {
                        PumpEnd::Cancelled | PumpEnd::ConsumerGone => break Ok(()),
                        PumpEnd::Lost(err) => {
                            self.handle.session.lock().await.retry_count += 1;
                            warn!("[{}] connection lost: {err}", self.device_id().await);
                        }
                    }
                }
                Err(err @ SessionError::Auth(_)) => {
                    error!("[{}] {err}; giving up until reconfigured", self.device_id().await);
                    break Err(err);
                }
                Err(err) => warn!("[{}] connect failed: {err}", self.device_id().await),
            }

            let delay = backoff.next_delay();
            self.handle.set_state(ConnectionState::Backoff).await;
            info!("[{}] retrying in {delay:?}", self.device_id().await);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_token.cancelled() => break Ok(()),
            }
        };

        self.disconnect().await;
        self.handle.set_state(ConnectionState::Disconnected).await;
        outcome
    }

    async fn device_id(&self) -> String {
        self.handle.session.lock().await.device_id().to_string()
    }

    async fn pump(
        &self,
        mut reader: C::Reader,
        events: &mpsc::Sender<RawEvent>,
        liveness_timeout: Duration,
        cancel_token: &CancellationToken,
    ) -> PumpEnd {
        let device_id = self.device_id().await;
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(liveness_timeout, reader.next_frame()) => next,
                _ = cancel_token.cancelled() => return PumpEnd::Cancelled,
            };

            let frame = match next {
                Err(_) => {
                    return PumpEnd::Lost(SessionError::Transport(format!(
                        "no traffic for {liveness_timeout:?}"
                    )))
                }
                Ok(Err(err)) => return PumpEnd::Lost(err),
                Ok(Ok(None)) => {
                    return PumpEnd::Lost(SessionError::Transport("closed by device".into()))
                }
                Ok(Ok(Some(frame))) => frame,
            };

            let received_at = Utc::now();
            self.handle.session.lock().await.last_seen = Some(received_at);
            trace_frame!(device_id, "<-", &frame);

            match protocol::decode(&frame) {
                Ok(InboundFrame::Event(event)) => {
                    if events.send(event.into_raw(received_at)).await.is_err() {
                        return PumpEnd::ConsumerGone;
                    }
                }
                Ok(InboundFrame::Auth(_)) => debug!("[{device_id}] stray auth frame ignored"),
                Err(err) => debug!("[{device_id}] dropping undecodable frame: {err}"),
            }
        }
    }
}
