// Hands finished artifacts to the platform and announces the delivery

use std::sync::Arc;

use crate::backends::{ForegroundService, NotificationSurface};
use crate::components::{Artifact, NotificationResult, NotificationSpec};
use crate::events::{BusEvent, EventBus, EventType, NotificationEvent};

pub struct DeliveryDispatcher {
    surface: Arc<dyn NotificationSurface>,
    foreground: Arc<dyn ForegroundService>,
    events: Arc<dyn EventBus>,
}

impl DeliveryDispatcher {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        foreground: Arc<dyn ForegroundService>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            surface,
            foreground,
            events,
        }
    }

    /// Post the artifact under the spec's handle. A platform failure is logged
    /// and returned, the delivered event is published either way.
    pub async fn deliver(&self, artifact: &Artifact, spec: &NotificationSpec) -> NotificationResult<()> {
        let handle = spec.handle();

        let outcome = if spec.platform.as_foreground_service {
            match spec.to_bytes() {
                Ok(raw_spec) => self.foreground.start(handle, artifact, raw_spec).await,
                Err(e) => Err(e),
            }
        } else {
            self.surface.notify(handle, artifact).await
        };

        match &outcome {
            Ok(()) => tracing::debug!(notification_id = %spec.id, handle = %handle, "Notification delivered"),
            Err(e) => tracing::error!(notification_id = %spec.id, handle = %handle, "Delivery failed: {}", e),
        }

        self.events.post(BusEvent::Notification(NotificationEvent::new(
            EventType::Delivered,
            spec.clone(),
        )));

        outcome
    }
}
