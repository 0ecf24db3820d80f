use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use guardbar_common::backend::PolicyDaemon;
use guardbar_common::registry::Registry;
use guardbar_common::render::{BarView, Renderer};
use guardbar_common::signal::DeviceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Subscribed,
}

/// State shared by the listener, the dispatcher and the renderer.
#[derive(Clone)]
pub struct MonitorState {
    registry: Arc<Registry>,
    inner: Arc<Mutex<StateInner>>,
    permanent: Arc<AtomicBool>,
    render_tx: Arc<watch::Sender<u64>>,
}

struct StateInner {
    error: Option<String>,
    daemon: Option<Arc<dyn PolicyDaemon>>,
    connection: ConnectionState,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorState {
    pub fn new() -> Self {
        let (render_tx, _) = watch::channel(0);
        Self {
            registry: Arc::new(Registry::new()),
            inner: Arc::new(Mutex::new(StateInner {
                error: None,
                daemon: None,
                connection: ConnectionState::Disconnected,
            })),
            permanent: Arc::new(AtomicBool::new(false)),
            render_tx: Arc::new(render_tx),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Applies a decoded event and requests a render.
    pub fn apply(&self, event: DeviceEvent) {
        self.registry.apply(event);
        self.request_render();
    }

    /// Bumps the render generation; subscribers wake up and redraw.
    pub fn request_render(&self) {
        self.render_tx.send_modify(|generation| *generation += 1);
    }

    pub fn subscribe_render(&self) -> watch::Receiver<u64> {
        self.render_tx.subscribe()
    }

    pub fn render(&self, renderer: &Renderer) -> BarView {
        let error = self.error();
        renderer.render(&self.registry.snapshot_ordered(), error.as_deref())
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// Records a successful subscription with its daemon handle.
    pub fn set_subscribed(&self, daemon: Arc<dyn PolicyDaemon>) {
        let mut inner = self.inner.lock();
        inner.error = None;
        inner.daemon = Some(daemon);
        inner.connection = ConnectionState::Subscribed;
    }

    /// Drops the daemon handle, recording `error` if given.
    pub fn set_disconnected(&self, error: Option<String>) {
        let mut inner = self.inner.lock();
        if error.is_some() {
            inner.error = error;
        }
        inner.daemon = None;
        inner.connection = ConnectionState::Disconnected;
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.lock().connection
    }

    pub fn daemon(&self) -> Option<Arc<dyn PolicyDaemon>> {
        self.inner.lock().daemon.clone()
    }

    pub fn permanent(&self) -> bool {
        self.permanent.load(Ordering::SeqCst)
    }

    /// Flips the permanent flag and returns the new value.
    pub fn toggle_permanent(&self) -> bool {
        !self.permanent.fetch_xor(true, Ordering::SeqCst)
    }
}
