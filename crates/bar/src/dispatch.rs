//! User actions on pending devices.

use std::sync::Arc;

use tracing::{debug, info, warn};

use guardbar_common::backend::Notifier;
use guardbar_common::config::ButtonConfig;
use guardbar_common::error::DispatchError;
use guardbar_common::format::Template;
use guardbar_common::render::render_notification;
use guardbar_common::types::{Action, ClickEvent, ClickIndex, DeviceId};

use crate::state::MonitorState;

/// What a mouse button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Apply(Action),
    TogglePermanent,
}

#[derive(Debug, Clone, Default)]
pub struct ButtonMap {
    buttons: ButtonConfig,
}

impl ButtonMap {
    pub fn new(buttons: ButtonConfig) -> Self {
        Self { buttons }
    }

    pub fn resolve(&self, button: u8) -> Option<ButtonAction> {
        if self.buttons.is_permanent_toggle(button) {
            return Some(ButtonAction::TogglePermanent);
        }
        self.buttons.action_for(button).map(ButtonAction::Apply)
    }
}

pub struct Dispatcher {
    state: MonitorState,
    notifier: Arc<dyn Notifier>,
    notification: Option<Template>,
    buttons: ButtonMap,
}

impl Dispatcher {
    pub fn new(
        state: MonitorState,
        notifier: Arc<dyn Notifier>,
        notification: Option<Template>,
        buttons: ButtonMap,
    ) -> Self {
        Self {
            state,
            notifier,
            notification,
            buttons,
        }
    }

    /// Routes a click from the bar. Clicks outside a device segment, on the
    /// separator, or with an unbound button do nothing.
    pub async fn handle_click(&self, click: ClickEvent) {
        let Some(button_action) = self.buttons.resolve(click.button) else {
            return;
        };
        let action = match button_action {
            ButtonAction::Apply(action) => action,
            ButtonAction::TogglePermanent => {
                let permanent = self.state.toggle_permanent();
                info!(target: "guardbar", event = "permanent_toggled", permanent);
                return;
            }
        };
        let id = match click.index {
            Some(ClickIndex::Device(id)) => id,
            Some(ClickIndex::Separator) | None => return,
        };
        match self.dispatch(action, id).await {
            Ok(()) => {}
            Err(DispatchError::UnknownDevice(id)) => {
                debug!(id, "click on a device that is no longer pending")
            }
            Err(e) => {
                warn!(target: "guardbar", event = "action_failed", id, %action, error = %e)
            }
        }
    }

    /// Applies `action` to a pending device.
    ///
    /// Allow and reject go to the daemon and leave the registry alone: the
    /// device disappears once the matching policy signal arrives, and stays
    /// pending if the call fails. Block only dismisses the device locally.
    pub async fn dispatch(&self, action: Action, id: DeviceId) -> Result<(), DispatchError> {
        let device = self
            .state
            .registry()
            .get(id)
            .ok_or(DispatchError::UnknownDevice(id))?;

        if let Some(template) = &self.notification {
            let message = render_notification(template, &device, action);
            if let Err(e) = self.notifier.notify(&message) {
                warn!(error = %e, "notification dropped");
            }
        }

        match action {
            Action::Block => {
                if self.state.registry().remove(id).is_some() {
                    info!(target: "guardbar", event = "device_dismissed", id);
                    self.state.request_render();
                }
                Ok(())
            }
            Action::Allow | Action::Reject => {
                let daemon = self.state.daemon().ok_or(DispatchError::NotConnected)?;
                let permanent = self.state.permanent();
                daemon.apply_device_policy(id, action, permanent).await?;
                info!(target: "guardbar", event = "policy_requested", id, %action, permanent);
                Ok(())
            }
        }
    }
}
