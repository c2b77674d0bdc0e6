// Collaborators consumed by the pipeline and dispatcher, plus the concrete
// implementations shipped with the crate

pub mod image_utils;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::components::{Artifact, Bitmap, NotificationError, NotificationHandle, NotificationResult, ResourceHandle};

pub use image_utils::HttpResourceResolver;
#[cfg(target_os = "linux")]
pub use linux::LinuxSurface;
pub use memory::{InMemoryForegroundService, InMemorySurface, StaticLaunchSurfaces};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves logical resource references (URLs, paths, resource names)
pub trait ResourceResolver: Send + Sync {
    /// Fetch and decode a bitmap. Fails with `AssetFailure` when missing or
    /// undecodable; callers bound the wait with [`resolve_bitmap_within`].
    fn resolve_bitmap<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, NotificationResult<Bitmap>>;

    /// Map a sound reference to a platform resource, `None` when unknown
    fn resolve_sound(&self, reference: &str) -> Option<ResourceHandle>;
}

/// Resolve a bitmap, turning an exceeded wait into `AssetTimeout`
pub async fn resolve_bitmap_within(
    resolver: &dyn ResourceResolver,
    reference: &str,
    timeout: Duration,
) -> NotificationResult<Bitmap> {
    match tokio::time::timeout(timeout, resolver.resolve_bitmap(reference)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::AssetTimeout {
            reference: reference.to_string(),
            timeout,
        }),
    }
}

/// Platform notification surface, identified by deterministic handles
pub trait NotificationSurface: Send + Sync {
    fn notify<'a>(&'a self, handle: NotificationHandle, artifact: &'a Artifact) -> BoxFuture<'a, NotificationResult<()>>;
    fn cancel(&self, handle: NotificationHandle) -> BoxFuture<'_, NotificationResult<()>>;
    fn cancel_all(&self) -> BoxFuture<'_, NotificationResult<()>>;
}

/// Foreground-service presentation. Receives the raw spec bytes so the
/// service can rebuild its state after a process restart.
pub trait ForegroundService: Send + Sync {
    fn start<'a>(
        &'a self,
        handle: NotificationHandle,
        artifact: &'a Artifact,
        raw_spec: Vec<u8>,
    ) -> BoxFuture<'a, NotificationResult<()>>;
}

/// Launch surfaces a full-screen action may target, looked up by name
pub trait LaunchSurfaces: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}
