// Runs when a trigger fires: rehydrates the spec, builds and delivers it, and
// removes one-shot records afterwards

use std::sync::Arc;

use uuid::Uuid;

use crate::backends::BoxFuture;
use crate::components::{NotificationSpec, WorkKind};
use crate::dispatch::DeliveryDispatcher;
use crate::pipeline::NotificationPipeline;
use crate::scheduler::TriggerLocks;
use crate::store::TriggerStore;
use crate::work::{WorkData, WorkFacility, WorkResult, WorkState, Worker, unique_work_name};

pub struct ScheduledWorkHandler {
    store: Arc<dyn TriggerStore>,
    facility: Arc<dyn WorkFacility>,
    pipeline: Arc<NotificationPipeline>,
    dispatcher: Arc<DeliveryDispatcher>,
    locks: Arc<TriggerLocks>,
}

impl ScheduledWorkHandler {
    pub fn new(
        store: Arc<dyn TriggerStore>,
        facility: Arc<dyn WorkFacility>,
        pipeline: Arc<NotificationPipeline>,
        dispatcher: Arc<DeliveryDispatcher>,
        locks: Arc<TriggerLocks>,
    ) -> Self {
        Self {
            store,
            facility,
            pipeline,
            dispatcher,
            locks,
        }
    }

    /// Always reports success: delivery is not safe to retry blindly, so
    /// failures are logged instead. `work_id` is the firing work item.
    pub async fn handle(&self, work_id: Uuid, data: WorkData) -> WorkResult {
        let id = data.id.as_str();

        match self.load_spec_bytes(&data) {
            Some(bytes) => match NotificationSpec::from_bytes(&bytes) {
                Ok(spec) => self.build_and_deliver(&spec).await,
                Err(e) => tracing::error!(notification_id = %id, "Unable to read stored notification: {}", e),
            },
            None => {
                tracing::warn!(notification_id = %id, "Trigger fired but no notification data was found");
            },
        }

        if data.work_request == WorkKind::OneTime {
            self.remove_one_shot_record(id, work_id).await;
        }

        WorkResult::Success
    }

    fn load_spec_bytes(&self, data: &WorkData) -> Option<Vec<u8>> {
        let record = match self.store.get(&data.id) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(notification_id = %data.id, "Failed to read trigger record: {}", e);
                None
            },
        };

        if let Some(bytes) = record.and_then(|record| record.notification) {
            return Some(bytes);
        }

        let legacy = data.notification.clone()?;
        tracing::warn!(
            notification_id = %data.id,
            "Trigger notification was created by an older version, consider recreating it"
        );
        Some(legacy)
    }

    async fn build_and_deliver(&self, spec: &NotificationSpec) {
        match self.pipeline.build(spec).await {
            Ok(artifact) => {
                if let Err(e) = self.dispatcher.deliver(&artifact, spec).await {
                    tracing::debug!(notification_id = %spec.id, "Scheduled delivery not retried: {}", e);
                }
            },
            Err(e) => {
                tracing::error!(notification_id = %spec.id, "Failed to build scheduled notification: {}", e);
            },
        }
    }

    async fn remove_one_shot_record(&self, id: &str, work_id: Uuid) {
        let _guard = self.locks.lock_id(id).await;

        // A replace that raced this firing owns the record now, whether its
        // work is still waiting or already running
        let live = [WorkState::Enqueued, WorkState::Running];
        match self.facility.query(&unique_work_name(id), &live) {
            Ok(items) if items.iter().any(|info| info.id != work_id) => {
                tracing::debug!(notification_id = %id, %work_id, "Trigger was rescheduled while firing, keeping record");
                return;
            },
            Ok(_) => {},
            Err(e) => tracing::warn!(notification_id = %id, "Unable to query trigger work: {}", e),
        }

        if let Err(e) = self.store.delete_by_id(id) {
            tracing::error!(notification_id = %id, "Failed to delete one-shot trigger record: {}", e);
        }
    }
}

impl Worker for ScheduledWorkHandler {
    fn do_work(&self, work_id: Uuid, data: WorkData) -> BoxFuture<'_, WorkResult> {
        Box::pin(self.handle(work_id, data))
    }
}
