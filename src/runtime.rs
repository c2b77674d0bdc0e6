// Shared worker pool and event bus, created explicitly and passed to every
// component instead of being looked up globally

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::components::{NotificationError, NotificationResult};
use crate::events::{BroadcastEventBus, EventBus};

pub struct NotifyRuntime {
    handle: Handle,
    /// Present only when this instance owns its worker threads
    runtime: Mutex<Option<Runtime>>,
    events: Arc<BroadcastEventBus>,
}

impl NotifyRuntime {
    /// Start a dedicated multi-threaded worker pool
    pub fn new() -> NotificationResult<Self> {
        let runtime = Builder::new_multi_thread()
            .thread_name("kodegen-notify-worker")
            .enable_all()
            .build()
            .map_err(|e| NotificationError::Config(format!("Failed to start worker pool: {}", e)))?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            events: Arc::new(BroadcastEventBus::default()),
        })
    }

    /// Share an existing tokio runtime
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: Mutex::new(None),
            events: Arc::new(BroadcastEventBus::default()),
        }
    }

    /// Share the runtime the caller is running on
    pub fn current() -> NotificationResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| NotificationError::Config(format!("No tokio runtime available: {}", e)))?;
        Ok(Self::with_handle(handle))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Concrete bus, for subscribing
    pub fn events(&self) -> Arc<BroadcastEventBus> {
        Arc::clone(&self.events)
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        self.events.clone()
    }

    /// Stop owned worker threads without waiting for in-flight tasks
    pub fn shutdown(&self) {
        if let Some(runtime) = self.runtime.lock().take() {
            tracing::debug!("Shutting down notification worker pool");
            runtime.shutdown_background();
        }
    }
}

impl Drop for NotifyRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
