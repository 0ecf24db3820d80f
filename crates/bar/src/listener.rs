//! Background task that keeps the registry in sync with usbguard signals.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use guardbar_common::backend::{PolicyDaemon, SignalBus, SignalStream};
use guardbar_common::rule::parse_rule;
use guardbar_common::signal::{decode, unknown_keys, DeviceEvent};
use guardbar_common::types::{Action, Interest};

use crate::state::MonitorState;

pub struct Listener {
    bus: Arc<dyn SignalBus>,
    state: MonitorState,
    interest: Interest,
    reconnect_delay: Duration,
    list_query: String,
}

impl Listener {
    pub fn new(bus: Arc<dyn SignalBus>, state: MonitorState, interest: Interest) -> Self {
        Self {
            bus,
            state,
            interest,
            reconnect_delay: Duration::from_secs(5),
            list_query: "match".into(),
        }
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn list_query(mut self, query: impl Into<String>) -> Self {
        self.list_query = query.into();
        self
    }

    pub fn spawn(self, cancel: CancellationToken) -> ListenerHandle {
        let task = tokio::spawn(self.run(cancel.clone()));
        ListenerHandle { cancel, task }
    }

    /// Runs until `cancel` fires. Cancellation is checked before each
    /// connection attempt and while waiting to reconnect; a live
    /// subscription runs until its stream ends.
    pub async fn run(self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            match self.bus.connect().await {
                Ok(session) => {
                    // ids from an earlier session may have been reused
                    self.state.registry().clear();
                    self.state.set_subscribed(session.daemon.clone());
                    self.state.request_render();
                    info!(
                        target: "guardbar",
                        event = "listener_subscribed",
                        "listening for device signals"
                    );

                    self.enumerate(session.daemon.as_ref()).await;
                    self.consume(session.signals).await;

                    warn!(
                        target: "guardbar",
                        event = "listener_stream_ended",
                        "signal stream ended"
                    );
                    self.state.set_disconnected(None);
                }
                Err(e) => {
                    error!(
                        target: "guardbar",
                        event = "listener_connect_failed",
                        error = %e,
                        "cannot subscribe to usbguard"
                    );
                    self.state.set_disconnected(Some(e.to_string()));
                    self.state.request_render();
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        info!(target: "guardbar", event = "listener_stopped", "listener stopped");
    }

    /// Seeds the registry with devices that were blocked before we subscribed.
    async fn enumerate(&self, daemon: &dyn PolicyDaemon) {
        let devices = match daemon.list_devices(&self.list_query).await {
            Ok(devices) => devices,
            Err(e) => {
                debug!(error = %e, "device enumeration failed");
                return;
            }
        };
        let mut seeded = 0usize;
        for listed in devices {
            match parse_rule(&listed.rule) {
                Some(rule) if rule.target == Action::Block => {
                    let device = rule.into_device(listed.id, &self.interest);
                    self.state.registry().insert(device);
                    seeded += 1;
                }
                Some(_) => {}
                None => debug!(id = listed.id, rule = %listed.rule, "unparsable device rule"),
            }
        }
        if seeded > 0 {
            debug!(seeded, "seeded pending devices");
            self.state.request_render();
        }
    }

    async fn consume(&self, mut signals: SignalStream) {
        while let Some(item) = signals.next().await {
            let signal = match item {
                Ok(signal) => signal,
                Err(e) => {
                    debug!(error = %e, "dropping undecodable signal");
                    continue;
                }
            };
            let unknown = unknown_keys(&signal.attributes);
            if !unknown.is_empty() {
                debug!(id = signal.id, ?unknown, "ignoring unknown device attributes");
            }
            match decode(&signal, &self.interest) {
                Some(event) => {
                    log_event(&event);
                    self.state.apply(event);
                }
                None => debug!(
                    id = signal.id,
                    member = signal.channel.member(),
                    state = signal.state,
                    "signal does not concern pending devices"
                ),
            }
        }
    }
}

fn log_event(event: &DeviceEvent) {
    match event {
        DeviceEvent::Inserted(device) => info!(
            target: "guardbar",
            event = "device_pending",
            id = device.id,
            name = device.attributes.name.as_deref().unwrap_or_default()
        ),
        DeviceEvent::Removed(id) => info!(target: "guardbar", event = "device_removed", id),
        DeviceEvent::PolicyChanged { id, granted } => {
            info!(target: "guardbar", event = "device_policy_changed", id, granted = %granted)
        }
    }
}

/// Handle to a spawned listener.
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the listener and waits up to `grace` for it to stop, aborting
    /// it afterwards. A subscription blocked on the bus only notices the
    /// cancellation once its stream yields or ends.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let abort = self.task.abort_handle();
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "listener task failed"),
            Err(_) => {
                debug!("listener still subscribed after grace period, aborting");
                abort.abort();
            }
        }
    }
}
