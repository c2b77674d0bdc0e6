// In-process collaborators for hosts without a native surface, and for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{BoxFuture, ForegroundService, LaunchSurfaces, NotificationSurface};
use crate::components::{Artifact, NotificationError, NotificationHandle, NotificationResult};

/// Live notification list kept in memory
#[derive(Default)]
pub struct InMemorySurface {
    active: DashMap<NotificationHandle, Artifact>,
    failing: AtomicBool,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: NotificationHandle) -> Option<Artifact> {
        self.active.get(&handle).map(|entry| entry.value().clone())
    }

    pub fn active_handles(&self) -> Vec<NotificationHandle> {
        let mut handles: Vec<_> = self.active.iter().map(|entry| *entry.key()).collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Make every subsequent post fail, simulating a refusing platform
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl NotificationSurface for InMemorySurface {
    fn notify<'a>(&'a self, handle: NotificationHandle, artifact: &'a Artifact) -> BoxFuture<'a, NotificationResult<()>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(NotificationError::Delivery {
                    message: "Surface rejected the notification".to_string(),
                });
            }
            self.active.insert(handle, artifact.clone());
            Ok(())
        })
    }

    fn cancel(&self, handle: NotificationHandle) -> BoxFuture<'_, NotificationResult<()>> {
        Box::pin(async move {
            self.active.remove(&handle);
            Ok(())
        })
    }

    fn cancel_all(&self) -> BoxFuture<'_, NotificationResult<()>> {
        Box::pin(async move {
            self.active.clear();
            Ok(())
        })
    }
}

/// Records foreground-service starts
#[derive(Default)]
pub struct InMemoryForegroundService {
    started: Mutex<Vec<(NotificationHandle, Artifact, Vec<u8>)>>,
}

impl InMemoryForegroundService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<(NotificationHandle, Artifact, Vec<u8>)> {
        self.started.lock().clone()
    }
}

impl ForegroundService for InMemoryForegroundService {
    fn start<'a>(
        &'a self,
        handle: NotificationHandle,
        artifact: &'a Artifact,
        raw_spec: Vec<u8>,
    ) -> BoxFuture<'a, NotificationResult<()>> {
        Box::pin(async move {
            self.started.lock().push((handle, artifact.clone(), raw_spec));
            Ok(())
        })
    }
}

/// Fixed table of launch surfaces. `"default"` maps to the main surface.
pub struct StaticLaunchSurfaces {
    main_surface: String,
    surfaces: HashMap<String, String>,
}

impl StaticLaunchSurfaces {
    pub fn new(main_surface: impl Into<String>) -> Self {
        Self {
            main_surface: main_surface.into(),
            surfaces: HashMap::new(),
        }
    }

    pub fn with_surface(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.surfaces.insert(name.into(), target.into());
        self
    }
}

impl LaunchSurfaces for StaticLaunchSurfaces {
    fn resolve(&self, name: &str) -> Option<String> {
        if name == "default" || name == self.main_surface {
            return Some(self.main_surface.clone());
        }
        self.surfaces.get(name).cloned()
    }
}
