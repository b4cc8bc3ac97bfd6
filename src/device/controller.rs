use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{BridgeConfig, DeviceConfig};
use crate::dispatch::Dispatcher;
use crate::error::SessionError;
use crate::models::{Command, RobotSession};
use crate::session::{Backoff, Connector, SessionHandle, SessionManager};

use super::loop_worker::processing_loop;
use super::pipeline::DevicePipeline;

/// Runs one robot: a session task feeding a bounded queue, and a processing
/// task draining it. The queue decouples network reads from mission and map
/// work.
pub struct DeviceController<C: Connector> {
    device: DeviceConfig,
    config: BridgeConfig,
    connector: C,
    dispatcher: Dispatcher,
    session: Option<SessionHandle<C::Writer>>,
    session_task: Option<JoinHandle<Result<(), SessionError>>>,
    processing_task: Option<JoinHandle<DevicePipeline>>,
    /// Pipeline handed back by a stopped processing task; the next start
    /// resumes it.
    pipeline: Option<DevicePipeline>,
    cancel_token: Option<CancellationToken>,
}

impl<C: Connector> DeviceController<C> {
    pub fn new(device: DeviceConfig, config: &BridgeConfig, connector: C, dispatcher: Dispatcher) -> Self {
        Self {
            device,
            config: config.clone(),
            connector,
            dispatcher,
            session: None,
            session_task: None,
            processing_task: None,
            pipeline: None,
            cancel_token: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device.blid
    }

    pub fn start(&mut self) -> Result<()> {
        if self.session_task.is_some() {
            bail!("device {} already running", self.device.display_name());
        }

        let cancel_token = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(self.config.event_queue_capacity.max(1));

        let manager = SessionManager::new(
            self.connector.clone(),
            self.device.identity(),
            self.config.handshake_timeout(),
            self.dispatcher.clone(),
        );
        let pipeline = match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => DevicePipeline::new(
                self.device.blid.clone(),
                &self.config,
                self.device.map.clone(),
                self.dispatcher.clone(),
            ),
        };

        self.session = Some(manager.handle());
        self.session_task = Some(tokio::spawn(manager.run(
            event_tx,
            Backoff::new(&self.config.backoff),
            self.config.liveness_timeout(),
            cancel_token.clone(),
        )));
        self.processing_task = Some(tokio::spawn(processing_loop(
            pipeline,
            event_rx,
            cancel_token.clone(),
        )));
        self.cancel_token = Some(cancel_token);

        info!(
            "device {} started ({})",
            self.device.display_name(),
            self.device.address
        );
        Ok(())
    }

    pub async fn send_command(&self, command: Command) -> Result<(), SessionError> {
        match &self.session {
            Some(session) => session.send_command(command).await,
            None => Err(SessionError::NotConnected),
        }
    }

    pub async fn session(&self) -> Option<RobotSession> {
        match &self.session {
            Some(session) => Some(session.snapshot().await),
            None => None,
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(task) = self.session_task.take() {
            let outcome = task.await.context("session task failed to join")?;
            if let Err(err) = outcome {
                warn!("device {} session ended with {err}", self.device.display_name());
            }
        }
        if let Some(task) = self.processing_task.take() {
            let pipeline = task.await.context("processing task failed to join")?;
            self.pipeline = Some(pipeline);
        }
        Ok(())
    }

    /// Restarts the device with new address or credentials. Clears a
    /// credential rejection; an unfinished mission carries over.
    pub async fn reconfigure(&mut self, device: DeviceConfig) -> Result<()> {
        self.stop().await?;
        self.device = device;
        self.start()
    }
}
