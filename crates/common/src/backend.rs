use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::{BusError, DecodeError, NotifyError};
use crate::signal::RawSignal;
use crate::types::{Action, DeviceId};

/// Device signals in bus delivery order. Payloads that could not be
/// deserialized arrive as `Err` and must not end the stream.
pub type SignalStream = BoxStream<'static, Result<RawSignal, DecodeError>>;

/// A device as listed by the policy daemon: its id and its rule text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDevice {
    pub id: DeviceId,
    pub rule: String,
}

/// Calls into the usbguard policy daemon.
#[async_trait]
pub trait PolicyDaemon: Send + Sync {
    async fn list_devices(&self, query: &str) -> Result<Vec<ListedDevice>, BusError>;
    async fn apply_device_policy(
        &self,
        id: DeviceId,
        target: Action,
        permanent: bool,
    ) -> Result<(), BusError>;
}

/// A live subscription: the daemon handle and the merged stream of
/// `DevicePresenceChanged` and `DevicePolicyChanged` signals.
pub struct BusSession {
    pub daemon: Arc<dyn PolicyDaemon>,
    pub signals: SignalStream,
}

/// Opens connections to the system bus.
#[async_trait]
pub trait SignalBus: Send + Sync {
    /// Connects and subscribes to both device signal channels.
    async fn connect(&self) -> Result<BusSession, BusError>;
}

/// Fire-and-forget desktop notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> Result<(), NotifyError>;
}
