//! Fan-out of canonical device events to external consumers.
//!
//! Publishing never waits on a consumer: every subscriber owns an unbounded
//! queue, so a slow consumer only grows its own backlog. Events are never
//! dropped for a live subscriber, and [`spawn_sink`] retries failed
//! deliveries, so consumers see every event at least once and must tolerate
//! duplicates.

pub mod sinks;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{error, warn};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::models::{DeviceEvent, EventPayload};

const SINK_RETRY_DELAY: Duration = Duration::from_millis(250);

struct DispatcherState {
    subscribers: Vec<mpsc::UnboundedSender<DeviceEvent>>,
    sequences: HashMap<String, u64>,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Mutex<DispatcherState>>,
}

pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl EventSubscription {
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DeviceEvent> {
        self.rx.try_recv().ok()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DispatcherState {
                subscribers: Vec::new(),
                sequences: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DispatcherState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().subscribers.push(tx);
        EventSubscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Tags `payload` with the device's next sequence number and hands it to
    /// every live subscriber. Returns the sequence number.
    pub fn publish(&self, device_id: &str, payload: EventPayload) -> u64 {
        let mut state = self.state();

        let seq = state.sequences.entry(device_id.to_string()).or_insert(0);
        *seq += 1;
        let event = DeviceEvent {
            device_id: device_id.to_string(),
            seq: *seq,
            payload,
        };
        let seq = event.seq;

        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        seq
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// External consumer of canonical events.
pub trait EventSink: Send + 'static {
    fn name(&self) -> &str;

    /// Delivers one event. An error triggers a redelivery of the same event.
    fn deliver(&mut self, event: &DeviceEvent) -> anyhow::Result<()>;
}

/// Runs `sink` on its own task, fed by a fresh subscription.
pub fn spawn_sink<S: EventSink>(
    dispatcher: &Dispatcher,
    mut sink: S,
    retry_limit: u32,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    let mut subscription = dispatcher.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = cancel_token.cancelled() => break,
            };

            let mut attempt = 0;
            loop {
                match sink.deliver(&event) {
                    Ok(()) => break,
                    Err(err) if attempt < retry_limit => {
                        attempt += 1;
                        warn!(
                            "sink {} failed on {} event #{} (attempt {attempt}): {err:#}",
                            sink.name(),
                            event.payload.name(),
                            event.seq
                        );
                        tokio::time::sleep(SINK_RETRY_DELAY).await;
                    }
                    Err(err) => {
                        error!(
                            "sink {} gave up on {} event #{} from {}: {err:#}",
                            sink.name(),
                            event.payload.name(),
                            event.seq,
                            event.device_id
                        );
                        break;
                    }
                }
            }
        }
    })
}
