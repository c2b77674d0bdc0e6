//! Declarative notifications with deferred, durable delivery
//!
//! A [`NotificationSpec`] is turned into a platform-ready [`Artifact`] by a
//! five-stage asynchronous [`NotificationPipeline`] that fetches icons and
//! style images with bounded waits. Specs can be delivered immediately or
//! scheduled through a [`TriggerSpec`]: the spec is persisted in a
//! [`TriggerStore`], enqueued as unique work with replace semantics, and
//! rehydrated by the [`ScheduledWorkHandler`] when the trigger fires.
//!
//! [`NotificationManager`] wires everything onto one explicitly created
//! [`NotifyRuntime`].

pub mod backends;
pub mod cancel;
pub mod components;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod manager;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod work;
pub mod worker;

pub use backends::*;
pub use cancel::{CancelScope, CancellationManager};
pub use components::*;
pub use config::NotifyConfig;
pub use dispatch::DeliveryDispatcher;
pub use events::{BroadcastEventBus, BusEvent, EventBus, EventType, NotificationEvent};
pub use manager::{NotificationManager, NotificationManagerBuilder};
pub use pipeline::NotificationPipeline;
pub use runtime::NotifyRuntime;
pub use scheduler::{TriggerLocks, TriggerScheduler};
pub use store::{SqliteTriggerStore, TriggerStore};
pub use work::{
    ExistingWorkPolicy, LocalWorkManager, WORK_TYPE_NOTIFICATION_TRIGGER, WorkData, WorkFacility, WorkInfo,
    WorkRequest, WorkResult, WorkSchedule, WorkState, Worker,
};
pub use worker::ScheduledWorkHandler;
