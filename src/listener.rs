//! The entry point used by host applications.

use crate::config::ListenerConfig;
use crate::event::EventBus;
use crate::host::Host;
use crate::injector::{hook_channel, WatchError, Watcher, WatcherHandle};
use crate::pipeline::{Channel, PipelineError};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Everything the watcher, hooks and interceptors of one listener share
pub struct ListenerContext {
    config: ListenerConfig,
    host: Arc<dyn Host>,
    events: Arc<EventBus>,
}

impl ListenerContext {
    /// Create a new context
    pub fn new(config: ListenerConfig, host: Arc<dyn Host>, events: Arc<EventBus>) -> Self {
        Self {
            config,
            host,
            events,
        }
    }

    /// The listener configuration
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// The host application
    pub fn host(&self) -> &dyn Host {
        &*self.host
    }

    /// The bus packet events are published on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The name of the owning component, used to tag log output
    pub fn name(&self) -> &str {
        self.host.name()
    }
}

/// Listens to the packets of every connection the host accepts
pub struct PacketListener {
    ctx: Arc<ListenerContext>,
    started: AtomicBool,
    watcher: Mutex<Option<WatcherHandle>>,
}

impl PacketListener {
    /// Create a listener for the given host. Nothing happens until `init`
    /// is called.
    pub fn new(host: Arc<dyn Host>, config: ListenerConfig) -> Self {
        Self {
            ctx: Arc::new(ListenerContext::new(config, host, Arc::new(EventBus::new()))),
            started: AtomicBool::new(false),
            watcher: Mutex::new(None),
        }
    }

    /// The bus packet events are published on
    pub fn events(&self) -> &EventBus {
        self.ctx.events()
    }

    /// The context shared with the listener's handlers
    pub fn context(&self) -> &Arc<ListenerContext> {
        &self.ctx
    }

    /// Start watching for the host's network subsystem in the background.
    /// Only the first call has any effect; later calls return `false`.
    pub fn init(&self) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("[{}] Packet listener is already initialized", self.ctx.name());
            return false;
        }

        match Watcher::spawn(Arc::clone(&self.ctx)) {
            Ok(handle) => {
                *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                info!("[{}] Packet listener initialized", self.ctx.name());
                true
            }
            Err(e) => {
                error!("[{}] Could not start the watcher thread: {}", self.ctx.name(), e);
                self.started.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Ask the watcher to stop if it is still waiting for the host
    pub fn stop(&self) {
        if let Some(handle) = &*self.watcher.lock().unwrap_or_else(PoisonError::into_inner) {
            handle.stop();
        }
    }

    /// Wait for the watcher to finish. Returns `None` if it was never
    /// started or was already joined.
    pub fn join(&self) -> Option<Result<usize, WatchError>> {
        let handle = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        handle.map(WatcherHandle::join)
    }

    /// Hook an already accepted connection directly, for hosts which do not
    /// expose a connection manager
    pub fn inject_channel(&self, channel: &Channel) -> Result<(), PipelineError> {
        hook_channel(&self.ctx, channel)
    }
}
