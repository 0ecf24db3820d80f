use notify_rust::Notification;

use guardbar_common::backend::Notifier;
use guardbar_common::error::NotifyError;

/// Desktop notifications through the freedesktop notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    summary: String,
    icon: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            summary: "USBGuard".into(),
            icon: "security-high".into(),
        }
    }
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for DesktopNotifier {
    /// Shows the notification from a detached thread; delivery failures are
    /// only logged.
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let mut notification = Notification::new();
        notification
            .summary(&self.summary)
            .body(message)
            .icon(&self.icon)
            .appname(guardbar_common::APP_ID);
        std::thread::Builder::new()
            .name("notify".into())
            .spawn(move || {
                if let Err(e) = notification.show() {
                    tracing::warn!(error = %e, "desktop notification failed");
                }
            })
            .map(drop)
            .map_err(|e| NotifyError(e.to_string()))
    }
}
