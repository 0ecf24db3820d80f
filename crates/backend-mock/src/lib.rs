use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use guardbar_common::backend::{BusSession, ListedDevice, Notifier, PolicyDaemon, SignalBus};
use guardbar_common::error::{BusError, DecodeError, NotifyError};
use guardbar_common::signal::{RawSignal, SignalChannel};
use guardbar_common::types::{Action, DeviceId};

/// Records policy calls and can be told to fail them.
#[derive(Clone, Default)]
pub struct MockDaemon {
    calls: Arc<Mutex<Vec<(DeviceId, Action, bool)>>>,
    listed: Arc<Mutex<Vec<ListedDevice>>>,
    fail_policy: Arc<Mutex<Option<String>>>,
    fail_list: Arc<Mutex<bool>>,
}

impl MockDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices returned by `list_devices`, as `(id, rule)`.
    pub fn with_listed(self, devices: &[(DeviceId, &str)]) -> Self {
        *self.listed.lock() = devices
            .iter()
            .map(|(id, rule)| ListedDevice {
                id: *id,
                rule: rule.to_string(),
            })
            .collect();
        self
    }

    pub fn fail_policy_calls(&self, reason: Option<&str>) {
        *self.fail_policy.lock() = reason.map(str::to_string);
    }

    pub fn fail_list_calls(&self, fail: bool) {
        *self.fail_list.lock() = fail;
    }

    pub fn calls(&self) -> Vec<(DeviceId, Action, bool)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PolicyDaemon for MockDaemon {
    async fn list_devices(&self, _query: &str) -> Result<Vec<ListedDevice>, BusError> {
        if *self.fail_list.lock() {
            return Err(BusError::Connection("listDevices unavailable".into()));
        }
        Ok(self.listed.lock().clone())
    }

    async fn apply_device_policy(
        &self,
        id: DeviceId,
        target: Action,
        permanent: bool,
    ) -> Result<(), BusError> {
        if let Some(reason) = self.fail_policy.lock().clone() {
            return Err(BusError::PolicyCall(reason));
        }
        self.calls.lock().push((id, target, permanent));
        Ok(())
    }
}

type SignalItem = Result<RawSignal, DecodeError>;

/// Feeds signals into one scripted session. Dropping it ends the stream.
#[derive(Clone)]
pub struct MockSignals {
    tx: mpsc::UnboundedSender<SignalItem>,
}

impl MockSignals {
    pub fn send(&self, signal: RawSignal) {
        let _ = self.tx.send(Ok(signal));
    }

    pub fn send_malformed(&self, member: &str) {
        let _ = self.tx.send(Err(DecodeError::Payload {
            member: member.to_string(),
            reason: "unexpected signature".into(),
        }));
    }

    /// `DevicePresenceChanged` for a blocked insertion.
    pub fn insert(&self, id: DeviceId, attributes: &[(&str, &str)]) {
        self.send(presence(id, 1, "block id 0000:0000", attributes));
    }

    pub fn remove(&self, id: DeviceId) {
        self.send(presence(id, 3, "", &[]));
    }

    /// `DevicePolicyChanged` granting `action`.
    pub fn policy(&self, id: DeviceId, action: Action) {
        self.send(RawSignal {
            channel: SignalChannel::Policy,
            id,
            state: action.target_code(),
            old_state: Action::Block.target_code(),
            rule: format!("{action} id 0000:0000"),
            attributes: Default::default(),
        });
    }
}

pub fn presence(id: DeviceId, state: u32, rule: &str, attributes: &[(&str, &str)]) -> RawSignal {
    RawSignal {
        channel: SignalChannel::Presence,
        id,
        state,
        old_state: 0,
        rule: rule.to_string(),
        attributes: attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// Bus whose connection attempts follow a script of sessions and failures.
/// Once the script is exhausted every attempt fails.
#[derive(Clone)]
pub struct MockBus {
    daemon: MockDaemon,
    script: Arc<Mutex<VecDeque<Result<mpsc::UnboundedReceiver<SignalItem>, BusError>>>>,
    connects: Arc<AtomicUsize>,
}

impl MockBus {
    pub fn new(daemon: MockDaemon) -> Self {
        Self {
            daemon,
            script: Arc::new(Mutex::new(VecDeque::new())),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues a successful connection and returns its signal feed.
    pub fn push_session(&self) -> MockSignals {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().push_back(Ok(rx));
        MockSignals { tx }
    }

    pub fn push_failure(&self, reason: &str) {
        self.script
            .lock()
            .push_back(Err(BusError::Connection(reason.to_string())));
    }

    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalBus for MockBus {
    async fn connect(&self) -> Result<BusSession, BusError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BusError::Connection("no session scripted".into())));
        let rx = next?;
        let signals = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();
        Ok(BusSession {
            daemon: Arc::new(self.daemon.clone()),
            signals,
        })
    }
}

/// Collects notification texts; optionally fails every call.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    failing: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError("no notification daemon".into()));
        }
        self.sent.lock().push(message.to_string());
        Ok(())
    }
}
