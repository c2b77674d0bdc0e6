//! Scheduling, firing and replace semantics of trigger notifications

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Script, ScriptedResolver, delivered_count, harness};
use kodegen_notify_trigger::{
    BroadcastEventBus, DeliveryDispatcher, ExistingWorkPolicy, InMemoryForegroundService, InMemorySurface,
    LocalWorkManager, NotificationPipeline, NotificationSpec, PlatformSpec, ScheduledWorkHandler, SqliteTriggerStore,
    StaticLaunchSurfaces, TimeUnit, TriggerLocks, TriggerScheduler, TriggerSpec, TriggerStore, WorkData,
    WorkFacility, WorkKind, WorkRequest, WorkResult,
};
use tokio::runtime::Handle;
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn test_one_shot_fires_once_and_removes_record() {
    let h = harness(ScriptedResolver::new());
    let mut events = h.manager.subscribe();

    h.manager
        .create_trigger_notification(
            NotificationSpec::new("n2", "default").with_title("Later"),
            TriggerSpec::once_after(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert!(h.store.get("n2").unwrap().is_some());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(delivered_count(&mut events, "n2"), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(delivered_count(&mut events, "n2"), 1);
    assert!(h.store.get("n2").unwrap().is_none());
    assert!(h.surface.get(NotificationSpec::new("n2", "default").handle()).is_some());
    assert!(h.manager.get_trigger_notification_ids().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(delivered_count(&mut events, "n2"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_record_survives_firing() {
    let h = harness(ScriptedResolver::new());
    let mut events = h.manager.subscribe();

    h.manager
        .create_trigger_notification(
            NotificationSpec::new("p1", "default"),
            TriggerSpec::Timestamp {
                fire_delay_seconds: 5,
                repeat_interval_seconds: Some(60),
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(delivered_count(&mut events, "p1"), 1);
    assert!(h.store.get("p1").unwrap().is_some());
    assert_eq!(h.manager.get_trigger_notification_ids().await.unwrap(), vec!["p1".to_string()]);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(delivered_count(&mut events, "p1"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interval_trigger_fires_immediately_then_repeats() {
    let h = harness(ScriptedResolver::new());
    let mut events = h.manager.subscribe();

    h.manager
        .create_trigger_notification(NotificationSpec::new("i1", "default"), TriggerSpec::interval(15, TimeUnit::Minutes))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(delivered_count(&mut events, "i1"), 1);

    tokio::time::sleep(Duration::from_secs(15 * 60)).await;
    assert_eq!(delivered_count(&mut events, "i1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rescheduling_same_id_replaces_previous_trigger() {
    let h = harness(ScriptedResolver::new());
    let mut events = h.manager.subscribe();
    let spec = NotificationSpec::new("n1", "default");

    h.manager
        .create_trigger_notification(spec.clone(), TriggerSpec::once_after(Duration::from_secs(5)))
        .await
        .unwrap();
    h.manager
        .create_trigger_notification(spec.clone().with_title("Updated"), TriggerSpec::once_after(Duration::from_secs(30)))
        .await
        .unwrap();

    assert_eq!(h.manager.get_trigger_notification_ids().await.unwrap(), vec!["n1".to_string()]);
    assert_eq!(h.store.list_all().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(delivered_count(&mut events, "n1"), 0);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(delivered_count(&mut events, "n1"), 1);
    let artifact = h.surface.get(spec.handle()).unwrap();
    assert_eq!(artifact.content_title.unwrap().plain, "Updated");
}

#[tokio::test(start_paused = true)]
async fn test_replace_during_firing_keeps_new_record() {
    let resolver = ScriptedResolver::new()
        .with("icon-5s", Script::Resolve(Duration::from_secs(5)))
        .with("icon-8s", Script::Resolve(Duration::from_secs(8)));
    let h = harness(resolver);
    let mut events = h.manager.subscribe();

    let one_shot = NotificationSpec::new("n1", "default")
        .with_platform(PlatformSpec::new("default").with_large_icon("icon-5s", false));
    h.manager
        .create_trigger_notification(one_shot, TriggerSpec::once_after(Duration::from_secs(5)))
        .await
        .unwrap();

    // the one-shot fires at 5s and is still fetching its icon at 6s
    tokio::time::sleep(Duration::from_secs(6)).await;
    let hourly = NotificationSpec::new("n1", "default")
        .with_title("Hourly")
        .with_platform(PlatformSpec::new("default").with_large_icon("icon-8s", false));
    h.manager
        .create_trigger_notification(hourly, TriggerSpec::interval(1, TimeUnit::Hours))
        .await
        .unwrap();

    // old firing finishes at 10s while the replacement is running
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(delivered_count(&mut events, "n1"), 2);
    assert!(h.store.get("n1").unwrap().is_some());
    assert_eq!(h.manager.get_trigger_notification_ids().await.unwrap(), vec!["n1".to_string()]);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(delivered_count(&mut events, "n1"), 1);
    let artifact = h.surface.get(NotificationSpec::new("n1", "default").handle()).unwrap();
    assert_eq!(artifact.content_title.unwrap().plain, "Hourly");
}

#[tokio::test]
async fn test_pending_ids_ignore_unrelated_tags() {
    let store = Arc::new(SqliteTriggerStore::open_in_memory().unwrap());
    let facility = Arc::new(LocalWorkManager::new(Handle::current()));
    let scheduler = TriggerScheduler::new(
        store,
        facility.clone(),
        Arc::new(BroadcastEventBus::default()),
        Arc::new(TriggerLocks::new()),
    );

    let delay = Duration::from_secs(3600);
    facility
        .enqueue_unique(
            "trigger:x",
            ExistingWorkPolicy::Replace,
            WorkRequest::one_time(delay, WorkData::trigger("x", WorkKind::OneTime))
                .add_tag("alpha")
                .add_tag("trigger-notification")
                .add_tag("trigger:x")
                .add_tag("zeta"),
        )
        .unwrap();
    // no unique-name tag on this one
    facility
        .enqueue_unique(
            "other",
            ExistingWorkPolicy::Replace,
            WorkRequest::one_time(delay, WorkData::trigger("y", WorkKind::OneTime)).add_tag("trigger-notification"),
        )
        .unwrap();
    // not a trigger at all
    facility
        .enqueue_unique(
            "trigger:z",
            ExistingWorkPolicy::Replace,
            WorkRequest::one_time(delay, WorkData::trigger("z", WorkKind::OneTime)).add_tag("sync"),
        )
        .unwrap();

    assert_eq!(scheduler.list_pending_trigger_ids().unwrap(), vec!["x".to_string()]);
}

struct HandlerFixture {
    handler: ScheduledWorkHandler,
    surface: Arc<InMemorySurface>,
    store: Arc<SqliteTriggerStore>,
}

fn handler_fixture() -> HandlerFixture {
    let surface = Arc::new(InMemorySurface::new());
    let store = Arc::new(SqliteTriggerStore::open_in_memory().unwrap());
    let events = Arc::new(BroadcastEventBus::default());
    let pipeline = NotificationPipeline::new(
        Arc::new(ScriptedResolver::new()),
        Arc::new(StaticLaunchSurfaces::new("MainActivity")),
        events.clone(),
        Handle::current(),
    );
    let dispatcher = DeliveryDispatcher::new(surface.clone(), Arc::new(InMemoryForegroundService::new()), events);
    let handler = ScheduledWorkHandler::new(
        store.clone(),
        Arc::new(LocalWorkManager::new(Handle::current())),
        Arc::new(pipeline),
        Arc::new(dispatcher),
        Arc::new(TriggerLocks::new()),
    );
    HandlerFixture {
        handler,
        surface,
        store,
    }
}

#[tokio::test]
async fn test_legacy_inline_payload_is_delivered() {
    let f = handler_fixture();
    let spec = NotificationSpec::new("legacy", "default").with_title("Old");
    let mut data = WorkData::trigger("legacy", WorkKind::OneTime);
    data.notification = Some(spec.to_bytes().unwrap());

    assert_eq!(f.handler.handle(Uuid::new_v4(), data).await, WorkResult::Success);
    assert!(f.surface.get(spec.handle()).is_some());
}

#[tokio::test]
async fn test_firing_without_data_is_a_successful_no_op() {
    let f = handler_fixture();
    let result = f.handler.handle(Uuid::new_v4(), WorkData::trigger("ghost", WorkKind::OneTime)).await;
    assert_eq!(result, WorkResult::Success);
    assert!(f.surface.is_empty());
}

#[tokio::test]
async fn test_failed_delivery_still_cleans_up_one_shot() {
    let f = handler_fixture();
    let spec = NotificationSpec::new("n1", "default");
    let trigger = TriggerSpec::once_after(Duration::from_secs(1));
    f.store
        .insert("n1", &spec.to_bytes().unwrap(), &trigger.to_bytes().unwrap(), WorkKind::OneTime)
        .unwrap();
    f.surface.set_failing(true);

    let result = f.handler.handle(Uuid::new_v4(), WorkData::trigger("n1", WorkKind::OneTime)).await;
    assert_eq!(result, WorkResult::Success);
    assert!(f.store.get("n1").unwrap().is_none());
}

#[tokio::test]
async fn test_periodic_firing_keeps_record() {
    let f = handler_fixture();
    let spec = NotificationSpec::new("p1", "default");
    let trigger = TriggerSpec::interval(1, TimeUnit::Hours);
    f.store
        .insert("p1", &spec.to_bytes().unwrap(), &trigger.to_bytes().unwrap(), WorkKind::Periodic)
        .unwrap();

    f.handler.handle(Uuid::new_v4(), WorkData::trigger("p1", WorkKind::Periodic)).await;
    assert!(f.store.get("p1").unwrap().is_some());
    assert!(f.surface.get(spec.handle()).is_some());
}
