//! Cancellation across the surface, the work queue and the trigger store

mod common;

use std::time::Duration;

use common::{ScriptedResolver, delivered_count, harness};
use kodegen_notify_trigger::{CancelScope, NotificationSpec, TriggerSpec, TriggerStore};
use tokio_test::assert_ok;

#[tokio::test(start_paused = true)]
async fn test_cancel_trigger_prevents_firing() {
    let h = harness(ScriptedResolver::new());
    let mut events = h.manager.subscribe();

    h.manager
        .create_trigger_notification(NotificationSpec::new("n3", "default"), TriggerSpec::once_after(Duration::from_secs(5)))
        .await
        .unwrap();
    h.manager.cancel_notification("n3", CancelScope::Trigger).await.unwrap();

    assert!(h.store.get("n3").unwrap().is_none());
    assert!(h.manager.get_trigger_notification_ids().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(delivered_count(&mut events, "n3"), 0);
    assert!(h.surface.is_empty());
}

#[tokio::test]
async fn test_cancel_displayed_keeps_pending_trigger_work() {
    let h = harness(ScriptedResolver::new());
    let spec = NotificationSpec::new("n1", "default");

    h.manager.display_notification(spec.clone()).await.unwrap();
    h.manager
        .create_trigger_notification(spec.clone(), TriggerSpec::once_after(Duration::from_secs(3600)))
        .await
        .unwrap();

    h.manager.cancel_notification("n1", CancelScope::Displayed).await.unwrap();

    assert!(h.surface.get(spec.handle()).is_none());
    // the record goes for every scope, the work entry stays
    assert!(h.store.get("n1").unwrap().is_none());
    assert_eq!(h.manager.get_trigger_notification_ids().await.unwrap(), vec!["n1".to_string()]);
}

#[tokio::test]
async fn test_cancel_all_clears_everything() {
    let h = harness(ScriptedResolver::new());

    for id in ["d1", "d2"] {
        h.manager
            .display_notification(NotificationSpec::new(id, "default"))
            .await
            .unwrap();
    }
    for id in ["t1", "t2"] {
        h.manager
            .create_trigger_notification(NotificationSpec::new(id, "default"), TriggerSpec::once_after(Duration::from_secs(3600)))
            .await
            .unwrap();
    }
    assert_eq!(h.surface.len(), 2);
    assert_eq!(h.store.list_all().unwrap().len(), 2);

    h.manager.cancel_all_notifications(CancelScope::All).await.unwrap();

    assert!(h.surface.is_empty());
    assert!(h.manager.get_trigger_notification_ids().await.unwrap().is_empty());
    assert!(h.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_all_displayed_leaves_triggers_scheduled() {
    let h = harness(ScriptedResolver::new());
    h.manager
        .display_notification(NotificationSpec::new("d1", "default"))
        .await
        .unwrap();
    h.manager
        .create_trigger_notification(NotificationSpec::new("t1", "default"), TriggerSpec::once_after(Duration::from_secs(3600)))
        .await
        .unwrap();

    h.manager.cancel_all_notifications(CancelScope::Displayed).await.unwrap();

    assert!(h.surface.is_empty());
    assert_eq!(h.manager.get_trigger_notification_ids().await.unwrap(), vec!["t1".to_string()]);
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let h = harness(ScriptedResolver::new());
    assert_ok!(h.manager.cancel_notification("missing", CancelScope::All).await);
    assert_ok!(h.manager.cancel_notification("missing", CancelScope::All).await);
    assert_ok!(h.manager.cancel_all_notifications(CancelScope::All).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_schedule_racing_cancel_ends_consistent() {
    let h = harness(ScriptedResolver::new());
    let manager = &h.manager;

    for round in 0..50 {
        let id = format!("race-{}", round % 5);
        let spec = NotificationSpec::new(id.clone(), "default");
        let trigger = TriggerSpec::once_after(Duration::from_secs(3600));

        let (scheduled, cancelled) = tokio::join!(
            manager.create_trigger_notification(spec, trigger),
            manager.cancel_notification(id.clone(), CancelScope::Trigger),
        );
        assert_ok!(scheduled);
        assert_ok!(cancelled);

        let record_present = h.store.get(&id).unwrap().is_some();
        let work_enqueued = manager.get_trigger_notification_ids().await.unwrap().contains(&id);
        assert_eq!(record_present, work_enqueued, "round {} left {} half scheduled", round, id);
    }
}
