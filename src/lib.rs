pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod mapping;
pub mod mission;
pub mod models;
pub mod session;
pub mod telemetry;
pub mod utils;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use config::{BridgeConfig, DeviceConfig};
use device::DeviceController;
use dispatch::{
    sinks::{JsonLinesSink, LogSink, MapDirectorySink},
    spawn_sink, Dispatcher, EventSubscription,
};
use error::SessionError;
use models::{Command, RobotSession};
use session::{Connector, TcpConnector};

const SINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Every configured robot plus the shared event dispatcher.
pub struct Bridge<C: Connector> {
    config: BridgeConfig,
    connector: C,
    dispatcher: Dispatcher,
    devices: HashMap<String, DeviceController<C>>,
}

impl<C: Connector> Bridge<C> {
    /// Builds one controller per device. Nothing connects until
    /// [`Bridge::start`], so subscribers attached in between see every event.
    pub fn new(config: &BridgeConfig, connector: C) -> Self {
        let dispatcher = Dispatcher::new();
        let devices = config
            .devices
            .iter()
            .map(|device| {
                let controller = DeviceController::new(
                    device.clone(),
                    config,
                    connector.clone(),
                    dispatcher.clone(),
                );
                (device.blid.clone(), controller)
            })
            .collect();

        Self {
            config: config.clone(),
            connector,
            dispatcher,
            devices,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.dispatcher.subscribe()
    }

    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.devices.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn start(&mut self) -> Result<()> {
        utils::logging::set_frame_tracing(self.config.debug_frames);
        for controller in self.devices.values_mut() {
            controller.start()?;
        }
        Ok(())
    }

    pub async fn send_command(&self, device_id: &str, command: Command) -> Result<(), SessionError> {
        let Some(controller) = self.devices.get(device_id) else {
            return Err(SessionError::UnknownDevice(device_id.to_string()));
        };
        controller.send_command(command).await
    }

    pub async fn session(&self, device_id: &str) -> Option<RobotSession> {
        self.devices.get(device_id)?.session().await
    }

    /// Applies new address or credentials to a configured device, or adds
    /// and starts a new one.
    pub async fn reconfigure(&mut self, device: DeviceConfig) -> Result<()> {
        device.validate()?;
        if let Some(controller) = self.devices.get_mut(&device.blid) {
            return controller.reconfigure(device).await;
        }

        let mut controller = DeviceController::new(
            device.clone(),
            &self.config,
            self.connector.clone(),
            self.dispatcher.clone(),
        );
        controller.start()?;
        self.devices.insert(device.blid, controller);
        Ok(())
    }

    /// Cancels every device and waits for its tasks. Missions in progress are
    /// left in their current phase.
    pub async fn shutdown(mut self) -> Result<()> {
        for (device_id, controller) in self.devices.iter_mut() {
            controller
                .stop()
                .await
                .with_context(|| format!("failed to stop device {device_id}"))?;
        }
        info!("bridge stopped");
        Ok(())
    }
}

/// Parses an operator console line: `<command>` for a single-device bridge,
/// otherwise `<device> <command>`.
pub fn parse_console_line(line: &str, devices: &[String]) -> Result<(String, Command), String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [command] => match devices {
            [only] => Ok((only.clone(), command.parse()?)),
            _ => Err("several devices configured; use '<device> <command>'".into()),
        },
        [device, command] => Ok((device.to_string(), command.parse()?)),
        _ => Err("expected '[<device>] <start|stop|pause|resume|dock>'".into()),
    }
}

pub fn run() -> Result<()> {
    utils::logging::init();

    let path = BridgeConfig::resolve_path(std::env::args())?;
    let config = BridgeConfig::load(&path)?;
    info!(
        "roomba-bridge starting with {} device(s) from {}",
        config.devices.len(),
        path.display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: BridgeConfig) -> Result<()> {
    let mut bridge = Bridge::new(&config, TcpConnector);

    let sink_cancel = CancellationToken::new();
    let retry_limit = config.sink_retry_limit;
    let mut sinks = vec![
        spawn_sink(bridge.dispatcher(), LogSink, retry_limit, sink_cancel.clone()),
        spawn_sink(
            bridge.dispatcher(),
            JsonLinesSink::new(std::io::stdout()),
            retry_limit,
            sink_cancel.clone(),
        ),
    ];
    if let Some(dir) = &config.map_output_dir {
        sinks.push(spawn_sink(
            bridge.dispatcher(),
            MapDirectorySink::new(dir.clone()),
            retry_limit,
            sink_cancel.clone(),
        ));
    }

    bridge.start()?;

    let device_ids = bridge.device_ids();
    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!("ctrl-c handler failed: {err}");
                }
                info!("shutdown requested");
                break;
            }
            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_console_line(&line, &device_ids) {
                    Ok((device_id, command)) => {
                        if let Err(err) = bridge.send_command(&device_id, command).await {
                            warn!("{} command for {device_id} rejected: {err}", command.as_str());
                        }
                    }
                    Err(err) => warn!("{err}"),
                },
                Ok(None) => console_open = false,
                Err(err) => {
                    warn!("console closed: {err}");
                    console_open = false;
                }
            },
        }
    }

    bridge.shutdown().await?;

    // With the bridge gone every subscription closes once drained.
    let drain = async {
        for sink in sinks {
            let _ = sink.await;
        }
    };
    if tokio::time::timeout(SINK_DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("event sinks did not drain in time");
        sink_cancel.cancel();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_line_single_device() {
        let devices = vec!["blid1".to_string()];
        assert_eq!(
            parse_console_line("dock", &devices).unwrap(),
            ("blid1".to_string(), Command::Dock)
        );
        assert_eq!(
            parse_console_line("  other   pause ", &devices).unwrap(),
            ("other".to_string(), Command::Pause)
        );
    }

    #[test]
    fn test_console_line_rejects_ambiguous_or_unknown() {
        let devices = vec!["a".to_string(), "b".to_string()];
        assert!(parse_console_line("start", &devices).is_err());
        assert!(parse_console_line("a vacuum", &devices).is_err());
        assert!(parse_console_line("a start now", &devices).is_err());
    }
}
