//! usbguard over the system bus (`org.usbguard1`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use zbus::names::BusName;
use zbus::{Connection, Message, Proxy};

use guardbar_common::backend::{BusSession, ListedDevice, PolicyDaemon, SignalBus};
use guardbar_common::config::UsbguardConfig;
use guardbar_common::error::{BusError, DecodeError};
use guardbar_common::signal::{RawSignal, SignalChannel};
use guardbar_common::types::{Action, DeviceId};

/// `DevicePresenceChanged(id, event, target, device_rule, attributes)`
type PresenceBody = (u32, u32, u32, String, HashMap<String, String>);
/// `DevicePolicyChanged(id, target_old, target_new, device_rule, rule_id, attributes)`
type PolicyBody = (u32, u32, u32, String, u32, HashMap<String, String>);

fn connection_error(e: impl std::fmt::Display) -> BusError {
    BusError::Connection(e.to_string())
}

/// Decodes a signal message from the `Devices1` interface.
pub fn decode_message(channel: SignalChannel, msg: &Message) -> Result<RawSignal, DecodeError> {
    let malformed = |e: zbus::Error| DecodeError::Payload {
        member: channel.member().to_string(),
        reason: e.to_string(),
    };
    let body = msg.body();
    match channel {
        SignalChannel::Presence => {
            let (id, event, target, rule, attributes) =
                body.deserialize::<PresenceBody>().map_err(malformed)?;
            Ok(RawSignal {
                channel,
                id,
                state: event,
                old_state: target,
                rule,
                attributes,
            })
        }
        SignalChannel::Policy => {
            let (id, target_old, target_new, rule, _rule_id, attributes) =
                body.deserialize::<PolicyBody>().map_err(malformed)?;
            Ok(RawSignal {
                channel,
                id,
                state: target_new,
                old_state: target_old,
                rule,
                attributes,
            })
        }
    }
}

/// Connects to usbguard-dbus on the system bus.
#[derive(Debug, Clone)]
pub struct UsbguardBus {
    config: UsbguardConfig,
}

impl UsbguardBus {
    pub fn new(config: UsbguardConfig) -> Self {
        Self { config }
    }

    async fn devices_proxy(&self, conn: Connection) -> Result<Proxy<'static>, BusError> {
        let c = &self.config;
        Proxy::new_owned(
            conn,
            c.bus_name.clone(),
            c.devices_path.clone(),
            c.interface.clone(),
        )
        .await
        .map_err(connection_error)
    }

    async fn ensure_service_running(&self, conn: &Connection) -> Result<(), BusError> {
        let dbus = zbus::fdo::DBusProxy::new(conn)
            .await
            .map_err(connection_error)?;
        let name = BusName::try_from(self.config.bus_name.as_str()).map_err(connection_error)?;
        if dbus.name_has_owner(name).await.map_err(connection_error)? {
            Ok(())
        } else {
            Err(BusError::Connection(format!(
                "{} has no owner on the system bus",
                self.config.bus_name
            )))
        }
    }
}

#[async_trait]
impl SignalBus for UsbguardBus {
    async fn connect(&self) -> Result<BusSession, BusError> {
        let conn = Connection::system().await.map_err(connection_error)?;
        self.ensure_service_running(&conn).await?;
        let proxy = self.devices_proxy(conn).await?;

        let presence = proxy
            .receive_signal(SignalChannel::Presence.member())
            .await
            .map_err(connection_error)?
            .map(|msg| decode_message(SignalChannel::Presence, &msg));
        let policy = proxy
            .receive_signal(SignalChannel::Policy.member())
            .await
            .map_err(connection_error)?
            .map(|msg| decode_message(SignalChannel::Policy, &msg));

        tracing::info!(
            target: "guardbar",
            event = "bus_subscribed",
            bus_name = %self.config.bus_name,
            "subscribed to usbguard device signals"
        );
        Ok(BusSession {
            daemon: Arc::new(UsbguardDaemon { proxy }),
            signals: stream::select(presence, policy).boxed(),
        })
    }
}

/// Method calls on `org.usbguard.Devices1`.
#[derive(Clone)]
pub struct UsbguardDaemon {
    proxy: Proxy<'static>,
}

#[async_trait]
impl PolicyDaemon for UsbguardDaemon {
    async fn list_devices(&self, query: &str) -> Result<Vec<ListedDevice>, BusError> {
        let devices: Vec<(u32, String)> = self
            .proxy
            .call("listDevices", &(query,))
            .await
            .map_err(connection_error)?;
        Ok(devices
            .into_iter()
            .map(|(id, rule)| ListedDevice { id, rule })
            .collect())
    }

    async fn apply_device_policy(
        &self,
        id: DeviceId,
        target: Action,
        permanent: bool,
    ) -> Result<(), BusError> {
        let rule_id: u32 = self
            .proxy
            .call("applyDevicePolicy", &(id, target.target_code(), permanent))
            .await
            .map_err(|e| BusError::PolicyCall(e.to_string()))?;
        tracing::debug!(id, %target, permanent, rule_id, "device policy applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/org/usbguard1/Devices";
    const IFACE: &str = "org.usbguard.Devices1";

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn signal<B>(channel: SignalChannel, body: &B) -> Message
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        Message::signal(PATH, IFACE, channel.member())
            .unwrap()
            .build(body)
            .unwrap()
    }

    #[test]
    fn presence_fields_are_positional() {
        let body: PresenceBody = (
            42,
            1,
            1,
            r#"block id 0781:5581 name "Mass Storage""#.to_string(),
            attrs(&[("name", "Mass Storage"), ("via-port", "2-1")]),
        );
        let msg = signal(SignalChannel::Presence, &body);
        let raw = decode_message(SignalChannel::Presence, &msg).unwrap();
        assert_eq!(raw.channel, SignalChannel::Presence);
        assert_eq!(raw.id, 42);
        assert_eq!(raw.state, 1);
        assert_eq!(raw.old_state, 1);
        assert_eq!(raw.rule, r#"block id 0781:5581 name "Mass Storage""#);
        assert_eq!(raw.attributes.get("via-port").map(String::as_str), Some("2-1"));
    }

    #[test]
    fn policy_skips_rule_id() {
        let body: PolicyBody = (
            7,
            1,
            0,
            "allow id 046d:c534".to_string(),
            99,
            attrs(&[("name", "USB Receiver")]),
        );
        let msg = signal(SignalChannel::Policy, &body);
        let raw = decode_message(SignalChannel::Policy, &msg).unwrap();
        assert_eq!(raw.id, 7);
        assert_eq!(raw.old_state, 1);
        assert_eq!(raw.state, 0);
        assert_eq!(raw.rule, "allow id 046d:c534");
        assert_eq!(raw.attributes.get("name").map(String::as_str), Some("USB Receiver"));
    }

    #[test]
    fn wrongly_typed_body_is_a_payload_error() {
        let msg = signal(SignalChannel::Presence, &(42u32, "not a presence body"));
        match decode_message(SignalChannel::Presence, &msg) {
            Err(DecodeError::Payload { member, .. }) => {
                assert_eq!(member, "DevicePresenceChanged")
            }
            other => panic!("expected payload error, got {other:?}"),
        }

        // a presence body on the policy channel lacks the rule id
        let body: PresenceBody = (1, 1, 1, "block id 1234:5678".to_string(), attrs(&[]));
        let msg = signal(SignalChannel::Policy, &body);
        assert!(matches!(
            decode_message(SignalChannel::Policy, &msg),
            Err(DecodeError::Payload { .. })
        ));
    }
}
