// Process event bus: delivery and trigger notifications for observers,
// plus sticky announcements that late subscribers can still read

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::components::NotificationSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Delivered,
    TriggerNotificationCreated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub event_type: EventType,
    pub notification: NotificationSpec,
}

impl NotificationEvent {
    pub fn new(event_type: EventType, notification: NotificationSpec) -> Self {
        Self {
            event_type,
            notification,
        }
    }
}

/// Everything that travels on the bus
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Notification(NotificationEvent),
    /// A full-screen launch target is about to be requested
    MainComponent(String),
}

impl BusEvent {
    fn sticky_key(&self) -> &'static str {
        match self {
            BusEvent::Notification(_) => "notification",
            BusEvent::MainComponent(_) => "main_component",
        }
    }
}

/// Fire-and-forget publication, no acknowledgement
pub trait EventBus: Send + Sync {
    fn post(&self, event: BusEvent);
    /// Publish and retain as the latest event of its kind
    fn post_sticky(&self, event: BusEvent);
}

/// Event bus backed by a tokio broadcast channel
pub struct BroadcastEventBus {
    sender: broadcast::Sender<BusEvent>,
    sticky: Mutex<HashMap<&'static str, BusEvent>>,
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sticky: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Latest sticky main-component announcement
    pub fn sticky_main_component(&self) -> Option<String> {
        match self.sticky.lock().get("main_component") {
            Some(BusEvent::MainComponent(component)) => Some(component.clone()),
            _ => None,
        }
    }
}

impl EventBus for BroadcastEventBus {
    fn post(&self, event: BusEvent) {
        // No receivers is not an error for a fire-and-forget bus
        if self.sender.send(event).is_err() {
            tracing::trace!("Event posted with no active subscribers");
        }
    }

    fn post_sticky(&self, event: BusEvent) {
        self.sticky.lock().insert(event.sticky_key(), event.clone());
        self.post(event);
    }
}
