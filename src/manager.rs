// Entry point wiring the pipeline, dispatcher, scheduler, work handler and
// cancellation onto one shared runtime

use std::future::Future;
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;

use crate::backends::{
    ForegroundService, HttpResourceResolver, InMemoryForegroundService, InMemorySurface, LaunchSurfaces,
    NotificationSurface, ResourceResolver, StaticLaunchSurfaces,
};
use crate::cancel::{CancelScope, CancellationManager};
use crate::components::{NotificationError, NotificationResult, NotificationSpec, TriggerSpec};
use crate::config::NotifyConfig;
use crate::dispatch::DeliveryDispatcher;
use crate::events::{BroadcastEventBus, BusEvent};
use crate::pipeline::NotificationPipeline;
use crate::runtime::NotifyRuntime;
use crate::scheduler::{TriggerLocks, TriggerScheduler};
use crate::store::{SqliteTriggerStore, TriggerStore};
use crate::work::{LocalWorkManager, Worker};
use crate::worker::ScheduledWorkHandler;

/// Display, schedule and cancel notifications.
///
/// Every operation runs on the shared runtime rather than the caller's task.
pub struct NotificationManager {
    runtime: Arc<NotifyRuntime>,
    pipeline: Arc<NotificationPipeline>,
    dispatcher: Arc<DeliveryDispatcher>,
    scheduler: Arc<TriggerScheduler>,
    cancellation: Arc<CancellationManager>,
    work: Arc<LocalWorkManager>,
    // Registered weakly with the work manager, kept alive here
    _handler: Arc<ScheduledWorkHandler>,
}

impl NotificationManager {
    pub fn builder(config: NotifyConfig) -> NotificationManagerBuilder {
        NotificationManagerBuilder::new(config)
    }

    /// Build the spec and post it right away
    pub async fn display_notification(&self, spec: NotificationSpec) -> NotificationResult<()> {
        spec.validate()?;
        let pipeline = Arc::clone(&self.pipeline);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.run(async move {
            let artifact = pipeline.build(&spec).await?;
            dispatcher.deliver(&artifact, &spec).await
        })
        .await
    }

    /// Persist the spec and schedule it, replacing any schedule with the same id
    pub async fn create_trigger_notification(
        &self,
        spec: NotificationSpec,
        trigger: TriggerSpec,
    ) -> NotificationResult<()> {
        let scheduler = Arc::clone(&self.scheduler);
        self.run(async move { scheduler.schedule(&spec, &trigger).await })
            .await
    }

    pub async fn get_trigger_notification_ids(&self) -> NotificationResult<Vec<String>> {
        let scheduler = Arc::clone(&self.scheduler);
        self.run(async move { scheduler.list_pending_trigger_ids() }).await
    }

    pub async fn cancel_notification(&self, id: impl Into<String>, scope: CancelScope) -> NotificationResult<()> {
        let id = id.into();
        let cancellation = Arc::clone(&self.cancellation);
        self.run(async move { cancellation.cancel(&id, scope).await })
            .await
    }

    pub async fn cancel_all_notifications(&self, scope: CancelScope) -> NotificationResult<()> {
        let cancellation = Arc::clone(&self.cancellation);
        self.run(async move { cancellation.cancel_all(scope).await })
            .await
    }

    /// Restore schedules held only in the trigger store, typically at startup
    pub async fn reschedule_persisted(&self) -> NotificationResult<usize> {
        let scheduler = Arc::clone(&self.scheduler);
        self.run(async move { scheduler.reschedule_persisted().await })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.runtime.events().subscribe()
    }

    pub fn events(&self) -> Arc<BroadcastEventBus> {
        self.runtime.events()
    }

    /// Stop pending triggers and owned worker threads. Records stay in the
    /// store for [`reschedule_persisted`](Self::reschedule_persisted).
    pub fn shutdown(&self) {
        self.work.shutdown();
        self.runtime.shutdown();
    }

    async fn run<F, T>(&self, task: F) -> NotificationResult<T>
    where
        F: Future<Output = NotificationResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.runtime
            .spawn(task)
            .await
            .map_err(|e| NotificationError::Work(format!("Notification task failed: {}", e)))?
    }
}

/// Collaborators default to host-less implementations: an in-memory surface,
/// the HTTP resolver and the SQLite store at `database_path`
pub struct NotificationManagerBuilder {
    config: NotifyConfig,
    runtime: Option<Arc<NotifyRuntime>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    surface: Option<Arc<dyn NotificationSurface>>,
    foreground: Option<Arc<dyn ForegroundService>>,
    launch_surfaces: Option<Arc<dyn LaunchSurfaces>>,
    store: Option<Arc<dyn TriggerStore>>,
}

impl NotificationManagerBuilder {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config,
            runtime: None,
            resolver: None,
            surface: None,
            foreground: None,
            launch_surfaces: None,
            store: None,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<NotifyRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_surface(mut self, surface: Arc<dyn NotificationSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_foreground_service(mut self, foreground: Arc<dyn ForegroundService>) -> Self {
        self.foreground = Some(foreground);
        self
    }

    pub fn with_launch_surfaces(mut self, launch_surfaces: Arc<dyn LaunchSurfaces>) -> Self {
        self.launch_surfaces = Some(launch_surfaces);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TriggerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> NotificationResult<NotificationManager> {
        let config = self.config;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => match NotifyRuntime::current() {
                Ok(runtime) => Arc::new(runtime),
                Err(_) => Arc::new(NotifyRuntime::new()?),
            },
        };

        let resolver: Arc<dyn ResourceResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(HttpResourceResolver::new(&config)?),
        };
        let store: Arc<dyn TriggerStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteTriggerStore::open(&config.database_path)?),
        };
        let surface = self
            .surface
            .unwrap_or_else(|| Arc::new(InMemorySurface::new()));
        let foreground = self
            .foreground
            .unwrap_or_else(|| Arc::new(InMemoryForegroundService::new()));
        let launch_surfaces = self
            .launch_surfaces
            .unwrap_or_else(|| Arc::new(StaticLaunchSurfaces::new(config.app_name.clone())));

        let events = runtime.event_bus();
        let handle = runtime.handle().clone();
        let locks = Arc::new(TriggerLocks::new());
        let work = Arc::new(LocalWorkManager::new(handle.clone()));

        let pipeline = Arc::new(
            NotificationPipeline::new(resolver, launch_surfaces, Arc::clone(&events), handle).with_config(&config),
        );
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            Arc::clone(&surface),
            foreground,
            Arc::clone(&events),
        ));
        let scheduler = Arc::new(TriggerScheduler::new(
            Arc::clone(&store),
            work.clone(),
            events,
            Arc::clone(&locks),
        ));
        let cancellation = Arc::new(CancellationManager::new(
            surface,
            work.clone(),
            Arc::clone(&store),
            Arc::clone(&locks),
        ));

        let handler = Arc::new(ScheduledWorkHandler::new(
            store,
            work.clone(),
            Arc::clone(&pipeline),
            Arc::clone(&dispatcher),
            locks,
        ));
        let weak_handler: Weak<ScheduledWorkHandler> = Arc::downgrade(&handler);
        let weak_worker: Weak<dyn Worker> = weak_handler;
        work.set_worker(weak_worker);

        tracing::debug!(database = %config.database_path.display(), "Notification manager ready");

        Ok(NotificationManager {
            runtime,
            pipeline,
            dispatcher,
            scheduler,
            cancellation,
            work,
            _handler: handler,
        })
    }
}
