// Durable work facility: unique named work with replace semantics, tag queries
// and cancellation, plus an in-process implementation driven by tokio timers

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::backends::BoxFuture;
use crate::components::{NotificationError, NotificationResult, WorkKind};

/// Tag shared by every trigger work item
pub const WORK_TYPE_NOTIFICATION_TRIGGER: &str = "trigger-notification";

/// Prefix of the per-notification unique work name and tag
pub const UNIQUE_NAME_PREFIX: &str = "trigger:";

pub fn unique_work_name(notification_id: &str) -> String {
    format!("{}{}", UNIQUE_NAME_PREFIX, notification_id)
}

/// What to do when work already exists under a unique name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    /// Cancel the existing work, only the new request will run
    Replace,
    /// Leave the existing work alone and drop the new request
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkState {
    pub fn is_finished(&self) -> bool {
        matches!(self, WorkState::Succeeded | WorkState::Failed | WorkState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkSchedule {
    OneTime { initial_delay: Duration },
    Periodic { interval: Duration, initial_delay: Duration },
}

impl WorkSchedule {
    pub fn initial_delay(&self) -> Duration {
        match self {
            WorkSchedule::OneTime { initial_delay } | WorkSchedule::Periodic { initial_delay, .. } => {
                *initial_delay
            },
        }
    }
}

/// Input payload handed to the worker when the work runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkData {
    pub id: String,
    pub work_type: String,
    pub work_request: WorkKind,
    /// Spec bytes embedded by older versions instead of the trigger store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Vec<u8>>,
}

impl WorkData {
    pub fn trigger(notification_id: impl Into<String>, work_request: WorkKind) -> Self {
        Self {
            id: notification_id.into(),
            work_type: WORK_TYPE_NOTIFICATION_TRIGGER.to_string(),
            work_request,
            notification: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub schedule: WorkSchedule,
    pub tags: Vec<String>,
    pub input: WorkData,
}

impl WorkRequest {
    pub fn one_time(initial_delay: Duration, input: WorkData) -> Self {
        Self {
            schedule: WorkSchedule::OneTime { initial_delay },
            tags: Vec::new(),
            input,
        }
    }

    pub fn periodic(interval: Duration, initial_delay: Duration, input: WorkData) -> Self {
        Self {
            schedule: WorkSchedule::Periodic {
                interval,
                initial_delay,
            },
            tags: Vec::new(),
            input,
        }
    }

    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Snapshot of a work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkInfo {
    pub id: Uuid,
    pub tags: Vec<String>,
    pub state: WorkState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    Failure,
}

/// Callback run when a work item fires. `work_id` identifies the firing item,
/// so a worker can tell its own run apart from work enqueued after it.
pub trait Worker: Send + Sync {
    fn do_work(&self, work_id: Uuid, data: WorkData) -> BoxFuture<'_, WorkResult>;
}

pub trait WorkFacility: Send + Sync {
    fn enqueue_unique(&self, name: &str, policy: ExistingWorkPolicy, request: WorkRequest) -> NotificationResult<Uuid>;
    fn cancel_unique(&self, name: &str) -> NotificationResult<()>;
    fn cancel_by_tag(&self, tag: &str) -> NotificationResult<()>;
    /// Forget finished work, returns how many items were removed
    fn prune_terminal(&self) -> NotificationResult<usize>;
    /// Items carrying `tag` whose state is one of `states` (any state when empty)
    fn query(&self, tag: &str, states: &[WorkState]) -> NotificationResult<Vec<WorkInfo>>;
}

struct WorkEntry {
    tags: Vec<String>,
    state: WorkState,
    abort: Option<AbortHandle>,
    enqueued_at: Instant,
}

impl WorkEntry {
    fn info(&self, id: Uuid) -> WorkInfo {
        WorkInfo {
            id,
            tags: self.tags.clone(),
            state: self.state,
        }
    }

    /// Enqueued work is stopped outright; running work finishes its current
    /// run and is not rescheduled
    fn cancel(&mut self) {
        if self.state.is_finished() {
            return;
        }
        if self.state == WorkState::Enqueued
            && let Some(abort) = self.abort.take()
        {
            abort.abort();
        }
        self.state = WorkState::Cancelled;
    }
}

#[derive(Default)]
struct WorkTable {
    entries: HashMap<Uuid, WorkEntry>,
    unique_names: HashMap<String, Uuid>,
    shut_down: bool,
}

impl WorkTable {
    fn prune_finished(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.state.is_finished());
        let entries = &self.entries;
        self.unique_names.retain(|_, id| entries.contains_key(id));
        before - self.entries.len()
    }
}

struct Shared {
    table: Mutex<WorkTable>,
    worker: RwLock<Option<Weak<dyn Worker>>>,
}

impl Shared {
    /// Enqueued -> Running, false when the item was cancelled meanwhile
    fn begin(&self, id: Uuid) -> bool {
        let mut table = self.table.lock();
        match table.entries.get_mut(&id) {
            Some(entry) if entry.state == WorkState::Enqueued => {
                entry.state = WorkState::Running;
                true
            },
            _ => false,
        }
    }

    fn finish(&self, id: Uuid, result: WorkResult) {
        let mut table = self.table.lock();
        if let Some(entry) = table.entries.get_mut(&id)
            && entry.state == WorkState::Running
        {
            entry.state = match result {
                WorkResult::Success => WorkState::Succeeded,
                WorkResult::Failure => WorkState::Failed,
            };
            entry.abort = None;
        }
    }

    /// Running -> Enqueued for the next periodic run
    fn requeue(&self, id: Uuid) -> bool {
        let mut table = self.table.lock();
        match table.entries.get_mut(&id) {
            Some(entry) if entry.state == WorkState::Running => {
                entry.state = WorkState::Enqueued;
                true
            },
            _ => false,
        }
    }

    fn worker(&self) -> Option<Arc<dyn Worker>> {
        self.worker.read().as_ref().and_then(Weak::upgrade)
    }

    async fn run(self: Arc<Self>, id: Uuid, schedule: WorkSchedule, input: WorkData) {
        let mut next_run = Instant::now() + schedule.initial_delay();
        loop {
            tokio::time::sleep_until(next_run).await;
            if !self.begin(id) {
                return;
            }

            let result = match self.worker() {
                Some(worker) => worker.do_work(id, input.clone()).await,
                None => {
                    tracing::warn!(work_id = %id, "No worker registered, dropping run");
                    WorkResult::Failure
                },
            };
            tracing::debug!(work_id = %id, notification_id = %input.id, ?result, "Work run finished");

            match schedule {
                WorkSchedule::OneTime { .. } => {
                    self.finish(id, result);
                    return;
                },
                WorkSchedule::Periodic { interval, .. } => {
                    if !self.requeue(id) {
                        return;
                    }
                    next_run += interval;
                    // Missed periods collapse into one run
                    let now = Instant::now();
                    if next_run < now {
                        next_run = now;
                    }
                },
            }
        }
    }
}

/// In-process work facility: every request runs as a task on the shared
/// runtime, sleeping until its initial delay and then firing once or
/// periodically. State lives in memory, so schedules must be re-established
/// from the trigger store after a restart.
pub struct LocalWorkManager {
    shared: Arc<Shared>,
    handle: Handle,
}

impl LocalWorkManager {
    pub fn new(handle: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(WorkTable::default()),
                worker: RwLock::new(None),
            }),
            handle,
        }
    }

    /// Register the callback run when work fires. Held weakly, the owner keeps
    /// it alive.
    pub fn set_worker(&self, worker: Weak<dyn Worker>) {
        *self.shared.worker.write() = Some(worker);
    }

    pub fn info(&self, id: Uuid) -> Option<WorkInfo> {
        self.shared.table.lock().entries.get(&id).map(|entry| entry.info(id))
    }

    /// Stop every pending timer and refuse further work
    pub fn shutdown(&self) {
        let mut table = self.shared.table.lock();
        table.shut_down = true;
        for entry in table.entries.values_mut() {
            if let Some(abort) = entry.abort.take() {
                abort.abort();
            }
        }
        tracing::debug!(items = table.entries.len(), "Work manager shut down");
    }
}

impl Drop for LocalWorkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl WorkFacility for LocalWorkManager {
    fn enqueue_unique(&self, name: &str, policy: ExistingWorkPolicy, request: WorkRequest) -> NotificationResult<Uuid> {
        let mut table = self.shared.table.lock();
        if table.shut_down {
            return Err(NotificationError::Work("Work manager has been shut down".to_string()));
        }

        // Finished items are only kept for inspection until the next enqueue
        let pruned = table.prune_finished();
        if pruned > 0 {
            tracing::trace!(pruned, "Pruned finished work");
        }

        if let Some(existing) = table.unique_names.get(name).copied() {
            let live = table
                .entries
                .get(&existing)
                .is_some_and(|entry| !entry.state.is_finished());
            if live {
                match policy {
                    ExistingWorkPolicy::Keep => return Ok(existing),
                    ExistingWorkPolicy::Replace => {
                        if let Some(entry) = table.entries.get_mut(&existing) {
                            entry.cancel();
                        }
                        tracing::debug!(unique_name = name, replaced = %existing, "Replacing existing work");
                    },
                }
            }
        }

        let id = Uuid::new_v4();
        let mut tags = request.tags;
        if !tags.iter().any(|tag| tag == name) {
            tags.push(name.to_string());
        }

        // Task blocks on the table lock until the entry below is in place
        let task = self
            .handle
            .spawn(Arc::clone(&self.shared).run(id, request.schedule, request.input));

        table.entries.insert(id, WorkEntry {
            tags,
            state: WorkState::Enqueued,
            abort: Some(task.abort_handle()),
            enqueued_at: Instant::now(),
        });
        table.unique_names.insert(name.to_string(), id);

        Ok(id)
    }

    fn cancel_unique(&self, name: &str) -> NotificationResult<()> {
        let mut table = self.shared.table.lock();
        if let Some(id) = table.unique_names.get(name).copied()
            && let Some(entry) = table.entries.get_mut(&id)
        {
            entry.cancel();
            tracing::debug!(unique_name = name, "Cancelled unique work");
        }
        Ok(())
    }

    fn cancel_by_tag(&self, tag: &str) -> NotificationResult<()> {
        let mut table = self.shared.table.lock();
        let mut cancelled = 0usize;
        for entry in table.entries.values_mut() {
            if entry.tags.iter().any(|t| t == tag) && !entry.state.is_finished() {
                entry.cancel();
                cancelled += 1;
            }
        }
        tracing::debug!(tag, cancelled, "Cancelled work by tag");
        Ok(())
    }

    fn prune_terminal(&self) -> NotificationResult<usize> {
        Ok(self.shared.table.lock().prune_finished())
    }

    fn query(&self, tag: &str, states: &[WorkState]) -> NotificationResult<Vec<WorkInfo>> {
        let table = self.shared.table.lock();
        let mut matches: Vec<(&Uuid, &WorkEntry)> = table
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.iter().any(|t| t == tag))
            .filter(|(_, entry)| states.is_empty() || states.contains(&entry.state))
            .collect();
        matches.sort_by_key(|(_, entry)| entry.enqueued_at);
        Ok(matches.into_iter().map(|(id, entry)| entry.info(*id)).collect())
    }
}

impl std::fmt::Debug for LocalWorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.shared.table.lock();
        f.debug_struct("LocalWorkManager")
            .field("items", &table.entries.len())
            .field("unique_names", &table.unique_names.keys().collect::<Vec<_>>())
            .field("shut_down", &table.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWorker {
        runs: Mutex<Vec<String>>,
    }

    impl Worker for RecordingWorker {
        fn do_work(&self, _work_id: Uuid, data: WorkData) -> BoxFuture<'_, WorkResult> {
            Box::pin(async move {
                self.runs.lock().push(data.id);
                WorkResult::Success
            })
        }
    }

    fn manager_with_worker() -> (LocalWorkManager, Arc<RecordingWorker>) {
        let manager = LocalWorkManager::new(Handle::current());
        let worker = Arc::new(RecordingWorker::default());
        let weak: Weak<dyn Worker> = Arc::downgrade(&(worker.clone() as Arc<dyn Worker>));
        manager.set_worker(weak);
        (manager, worker)
    }

    fn one_shot(id: &str, delay_secs: u64) -> WorkRequest {
        WorkRequest::one_time(Duration::from_secs(delay_secs), WorkData::trigger(id, WorkKind::OneTime))
            .add_tag(WORK_TYPE_NOTIFICATION_TRIGGER)
            .add_tag(unique_work_name(id))
    }

    #[tokio::test(start_paused = true)]
    async fn one_time_work_fires_after_delay() {
        let (manager, worker) = manager_with_worker();
        let id = manager
            .enqueue_unique("trigger:n1", ExistingWorkPolicy::Replace, one_shot("n1", 5))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(worker.runs.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*worker.runs.lock(), vec!["n1".to_string()]);
        assert_eq!(manager.info(id).unwrap().state, WorkState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_supersedes_existing_work() {
        let (manager, worker) = manager_with_worker();
        let first = manager
            .enqueue_unique("trigger:n1", ExistingWorkPolicy::Replace, one_shot("n1", 5))
            .unwrap();
        let second = manager
            .enqueue_unique("trigger:n1", ExistingWorkPolicy::Replace, one_shot("n1", 10))
            .unwrap();

        let enqueued = manager
            .query(WORK_TYPE_NOTIFICATION_TRIGGER, &[WorkState::Enqueued])
            .unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].id, second);
        assert_eq!(manager.info(first).unwrap().state, WorkState::Cancelled);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(worker.runs.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_policy_leaves_existing_work() {
        let (manager, _worker) = manager_with_worker();
        let first = manager
            .enqueue_unique("trigger:n1", ExistingWorkPolicy::Keep, one_shot("n1", 5))
            .unwrap();
        let second = manager
            .enqueue_unique("trigger:n1", ExistingWorkPolicy::Keep, one_shot("n1", 1))
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_work_is_pruned_on_next_enqueue() {
        let (manager, worker) = manager_with_worker();
        let fired = manager
            .enqueue_unique("trigger:a", ExistingWorkPolicy::Replace, one_shot("a", 1))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(worker.runs.lock().len(), 1);
        assert_eq!(manager.info(fired).unwrap().state, WorkState::Succeeded);

        manager
            .enqueue_unique("trigger:b", ExistingWorkPolicy::Replace, one_shot("b", 60))
            .unwrap();
        assert!(manager.info(fired).is_none());
        assert_eq!(manager.query(WORK_TYPE_NOTIFICATION_TRIGGER, &[]).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_work_repeats_until_cancelled() {
        let (manager, worker) = manager_with_worker();
        let request = WorkRequest::periodic(
            Duration::from_secs(60),
            Duration::from_secs(10),
            WorkData::trigger("p1", WorkKind::Periodic),
        )
        .add_tag(WORK_TYPE_NOTIFICATION_TRIGGER);
        manager
            .enqueue_unique("trigger:p1", ExistingWorkPolicy::Replace, request)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(135)).await;
        assert_eq!(worker.runs.lock().len(), 3);

        manager.cancel_unique("trigger:p1").unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(worker.runs.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_by_tag_and_prune() {
        let (manager, worker) = manager_with_worker();
        manager
            .enqueue_unique("trigger:a", ExistingWorkPolicy::Replace, one_shot("a", 5))
            .unwrap();
        manager
            .enqueue_unique("trigger:b", ExistingWorkPolicy::Replace, one_shot("b", 5))
            .unwrap();

        manager.cancel_by_tag(WORK_TYPE_NOTIFICATION_TRIGGER).unwrap();
        assert!(manager
            .query(WORK_TYPE_NOTIFICATION_TRIGGER, &[WorkState::Enqueued])
            .unwrap()
            .is_empty());
        assert_eq!(manager.prune_terminal().unwrap(), 2);
        assert!(manager.query(WORK_TYPE_NOTIFICATION_TRIGGER, &[]).unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(worker.runs.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_new_work() {
        let (manager, worker) = manager_with_worker();
        manager
            .enqueue_unique("trigger:a", ExistingWorkPolicy::Replace, one_shot("a", 5))
            .unwrap();
        manager.shutdown();

        let refused = manager.enqueue_unique("trigger:b", ExistingWorkPolicy::Replace, one_shot("b", 1));
        assert!(matches!(refused, Err(NotificationError::Work(_))));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(worker.runs.lock().is_empty());
    }
}
