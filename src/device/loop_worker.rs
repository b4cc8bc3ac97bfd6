use std::time::Instant;

use log::info;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::pipeline::DevicePipeline;
use crate::models::RawEvent;

/// Drains the device's raw event queue in arrival order until cancelled or
/// until the session side hangs up.
pub async fn processing_loop(
    mut pipeline: DevicePipeline,
    mut events: mpsc::Receiver<RawEvent>,
    cancel_token: CancellationToken,
) -> DevicePipeline {
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(raw) => pipeline.handle(&raw, Instant::now()),
                None => {
                    info!("[{}] event stream closed", pipeline.device_id());
                    break;
                }
            },
            _ = cancel_token.cancelled() => {
                info!("[{}] processing loop shutting down", pipeline.device_id());
                break;
            }
        }
    }
    pipeline
}
