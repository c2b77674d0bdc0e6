// Trigger scheduling: persists the spec, enqueues unique durable work with
// replace semantics and lists what is still pending

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::components::{NotificationResult, NotificationSpec, TriggerSpec};
use crate::events::{BusEvent, EventBus, EventType, NotificationEvent};
use crate::store::TriggerStore;
use crate::work::{
    ExistingWorkPolicy, UNIQUE_NAME_PREFIX, WORK_TYPE_NOTIFICATION_TRIGGER, WorkData, WorkFacility, WorkRequest,
    WorkState, unique_work_name,
};

/// Serializes store and work mutations per notification id.
///
/// Per-id operations hold the gate shared plus the id's mutex; bulk
/// operations hold the gate exclusively.
#[derive(Default)]
pub struct TriggerLocks {
    gate: RwLock<()>,
    ids: DashMap<String, Arc<Mutex<()>>>,
}

pub struct IdGuard<'a> {
    locks: &'a TriggerLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
    _gate: RwLockReadGuard<'a, ()>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .ids
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl TriggerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_id(&self, id: &str) -> IdGuard<'_> {
        let gate = self.gate.read().await;
        let mutex = self
            .ids
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        IdGuard {
            locks: self,
            id: id.to_string(),
            guard: Some(guard),
            _gate: gate,
        }
    }

    pub async fn lock_all(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }
}

pub struct TriggerScheduler {
    store: Arc<dyn TriggerStore>,
    facility: Arc<dyn WorkFacility>,
    events: Arc<dyn EventBus>,
    locks: Arc<TriggerLocks>,
}

impl TriggerScheduler {
    pub fn new(
        store: Arc<dyn TriggerStore>,
        facility: Arc<dyn WorkFacility>,
        events: Arc<dyn EventBus>,
        locks: Arc<TriggerLocks>,
    ) -> Self {
        Self {
            store,
            facility,
            events,
            locks,
        }
    }

    /// Persist `spec` and schedule its delivery, replacing any schedule that
    /// already exists for the same id
    pub async fn schedule(&self, spec: &NotificationSpec, trigger: &TriggerSpec) -> NotificationResult<()> {
        spec.validate()?;
        trigger.validate()?;
        let spec_bytes = spec.to_bytes()?;
        let trigger_bytes = trigger.to_bytes()?;

        {
            let _guard = self.locks.lock_id(&spec.id).await;
            self.store
                .insert(&spec.id, &spec_bytes, &trigger_bytes, trigger.work_kind())?;
            self.enqueue_or_roll_back(&spec.id, trigger, trigger.initial_delay())?;
        }

        tracing::debug!(
            notification_id = %spec.id,
            work_kind = %trigger.work_kind(),
            delay_secs = trigger.initial_delay().as_secs(),
            "Trigger notification scheduled"
        );

        self.events.post(BusEvent::Notification(NotificationEvent::new(
            EventType::TriggerNotificationCreated,
            spec.clone(),
        )));
        Ok(())
    }

    /// Enqueue the work for an already-persisted record. On failure the id is
    /// left with neither a record nor live work.
    fn enqueue_or_roll_back(&self, id: &str, trigger: &TriggerSpec, initial_delay: Duration) -> NotificationResult<()> {
        let name = unique_work_name(id);
        let request = Self::work_request(id, trigger, initial_delay);

        if let Err(e) = self.facility.enqueue_unique(&name, ExistingWorkPolicy::Replace, request) {
            tracing::error!(notification_id = %id, unique_name = %name, "Failed to enqueue trigger work: {}", e);
            if let Err(cancel_error) = self.facility.cancel_unique(&name) {
                tracing::error!(unique_name = %name, "Failed to cancel previous trigger work: {}", cancel_error);
            }
            if let Err(store_error) = self.store.delete_by_id(id) {
                tracing::error!(notification_id = %id, "Failed to roll back trigger record: {}", store_error);
            }
            return Err(e);
        }
        Ok(())
    }

    fn work_request(id: &str, trigger: &TriggerSpec, initial_delay: Duration) -> WorkRequest {
        let input = WorkData::trigger(id, trigger.work_kind());
        let request = match trigger.repeat_interval() {
            Some(interval) => WorkRequest::periodic(interval, initial_delay, input),
            None => WorkRequest::one_time(initial_delay, input),
        };
        request
            .add_tag(WORK_TYPE_NOTIFICATION_TRIGGER)
            .add_tag(unique_work_name(id))
    }

    /// Ids with a trigger that is enqueued and has neither fired nor been
    /// cancelled
    pub fn list_pending_trigger_ids(&self) -> NotificationResult<Vec<String>> {
        let pending = self
            .facility
            .query(WORK_TYPE_NOTIFICATION_TRIGGER, &[WorkState::Enqueued])?;

        Ok(pending
            .iter()
            .filter_map(|info| {
                info.tags
                    .iter()
                    .find_map(|tag| tag.strip_prefix(UNIQUE_NAME_PREFIX))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
            })
            .collect())
    }

    /// Re-establish schedules for stored records that have no live work, such
    /// as after a restart with an in-memory work facility. Returns how many
    /// were rescheduled.
    pub async fn reschedule_persisted(&self) -> NotificationResult<usize> {
        let now = Utc::now();
        let mut rescheduled = 0;

        for record in self.store.list_all()? {
            let id = record.notification_id.as_str();
            let _guard = self.locks.lock_id(id).await;

            let live = self
                .facility
                .query(&unique_work_name(id), &[WorkState::Enqueued, WorkState::Running])?;
            if !live.is_empty() {
                continue;
            }

            let (trigger, delay) = match record
                .decode_trigger()
                .and_then(|trigger| Ok((trigger, record.next_run_delay(now)?)))
            {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!(notification_id = %id, "Skipping unreadable trigger record: {}", e);
                    continue;
                },
            };

            // Keep: work enqueued since the check above wins over the stored schedule
            let name = unique_work_name(id);
            self.facility
                .enqueue_unique(&name, ExistingWorkPolicy::Keep, Self::work_request(id, &trigger, delay))?;
            tracing::debug!(notification_id = %id, delay_secs = delay.as_secs(), "Restored trigger schedule");
            rescheduled += 1;
        }

        tracing::debug!(rescheduled, "Persisted trigger notifications rescheduled");
        Ok(rescheduled)
    }
}
