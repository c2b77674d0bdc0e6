//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use kodegen_notify_trigger::{
    Bitmap, BoxFuture, BroadcastEventBus, BusEvent, EventType, InMemorySurface, NotificationError, NotificationManager,
    NotificationResult, NotifyConfig, NotifyRuntime, ResourceHandle, ResourceResolver, SqliteTriggerStore,
    StaticLaunchSurfaces,
};
use tokio::sync::broadcast;

/// How a scripted reference behaves
#[derive(Clone)]
pub enum Script {
    /// Resolves to a 4x4 bitmap after the delay
    Resolve(Duration),
    /// Fails after the delay
    Fail(Duration),
    /// Never completes
    Hang,
}

/// Resolver whose answers are set up per reference; unknown references fail
#[derive(Default)]
pub struct ScriptedResolver {
    scripts: HashMap<String, Script>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: &str, script: Script) -> Self {
        self.scripts.insert(reference.to_string(), script);
        self
    }
}

pub fn test_bitmap() -> Bitmap {
    Bitmap::from_rgba(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])))
}

impl ResourceResolver for ScriptedResolver {
    fn resolve_bitmap<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, NotificationResult<Bitmap>> {
        Box::pin(async move {
            let failure = || NotificationError::AssetFailure {
                reference: reference.to_string(),
                message: "scripted failure".to_string(),
            };
            match self.scripts.get(reference).cloned() {
                Some(Script::Resolve(delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(test_bitmap())
                },
                Some(Script::Fail(delay)) => {
                    tokio::time::sleep(delay).await;
                    Err(failure())
                },
                Some(Script::Hang) => std::future::pending().await,
                None => Err(failure()),
            }
        })
    }

    fn resolve_sound(&self, reference: &str) -> Option<ResourceHandle> {
        (reference == "default").then_some(ResourceHandle::Default)
    }
}

pub struct Harness {
    pub manager: NotificationManager,
    pub surface: Arc<InMemorySurface>,
    pub store: Arc<SqliteTriggerStore>,
    pub events: Arc<BroadcastEventBus>,
}

/// Route crate logs to the test output, once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Manager on the test's own runtime with in-memory collaborators
pub fn harness(resolver: ScriptedResolver) -> Harness {
    init_tracing();
    let runtime = Arc::new(NotifyRuntime::current().unwrap());
    let surface = Arc::new(InMemorySurface::new());
    let store = Arc::new(SqliteTriggerStore::open_in_memory().unwrap());

    let manager = NotificationManager::builder(NotifyConfig::default())
        .with_runtime(runtime.clone())
        .with_resolver(Arc::new(resolver))
        .with_surface(surface.clone())
        .with_launch_surfaces(Arc::new(StaticLaunchSurfaces::new("MainActivity")))
        .with_store(store.clone())
        .build()
        .unwrap();

    Harness {
        manager,
        surface,
        store,
        events: runtime.events(),
    }
}

/// Drain the receiver and count delivered events for `id`
pub fn delivered_count(receiver: &mut broadcast::Receiver<BusEvent>, id: &str) -> usize {
    let mut count = 0;
    while let Ok(event) = receiver.try_recv() {
        if let BusEvent::Notification(event) = event
            && event.event_type == EventType::Delivered
            && event.notification.id == id
        {
            count += 1;
        }
    }
    count
}
