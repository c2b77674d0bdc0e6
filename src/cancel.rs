// Cancellation of displayed notifications and pending triggers

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::NotificationSurface;
use crate::components::{NotificationHandle, NotificationResult};
use crate::scheduler::TriggerLocks;
use crate::store::TriggerStore;
use crate::work::{WORK_TYPE_NOTIFICATION_TRIGGER, WorkFacility, unique_work_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelScope {
    /// Live notifications on the platform surface
    Displayed,
    /// Pending scheduled work
    Trigger,
    All,
}

impl CancelScope {
    fn includes_displayed(self) -> bool {
        matches!(self, CancelScope::Displayed | CancelScope::All)
    }

    fn includes_trigger(self) -> bool {
        matches!(self, CancelScope::Trigger | CancelScope::All)
    }
}

pub struct CancellationManager {
    surface: Arc<dyn NotificationSurface>,
    facility: Arc<dyn WorkFacility>,
    store: Arc<dyn TriggerStore>,
    locks: Arc<TriggerLocks>,
}

impl CancellationManager {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        facility: Arc<dyn WorkFacility>,
        store: Arc<dyn TriggerStore>,
        locks: Arc<TriggerLocks>,
    ) -> Self {
        Self {
            surface,
            facility,
            store,
            locks,
        }
    }

    /// Cancel one notification. The trigger record is deleted for every scope.
    pub async fn cancel(&self, id: &str, scope: CancelScope) -> NotificationResult<()> {
        let _guard = self.locks.lock_id(id).await;

        if scope.includes_displayed() {
            self.surface.cancel(NotificationHandle::from_id(id)).await?;
        }

        if scope.includes_trigger() {
            self.facility.cancel_unique(&unique_work_name(id))?;
        }

        self.store.delete_by_id(id)?;
        tracing::debug!(notification_id = %id, ?scope, "Notification cancelled");
        Ok(())
    }

    /// Cancel everything in `scope`. The trigger store is cleared for every
    /// scope.
    pub async fn cancel_all(&self, scope: CancelScope) -> NotificationResult<()> {
        let _gate = self.locks.lock_all().await;

        if scope.includes_displayed() {
            self.surface.cancel_all().await?;
        }

        if scope.includes_trigger() {
            self.facility.cancel_by_tag(WORK_TYPE_NOTIFICATION_TRIGGER)?;
            let pruned = self.facility.prune_terminal()?;
            tracing::debug!(pruned, "Pruned finished work");
        }

        self.store.delete_all()?;
        tracing::debug!(?scope, "All notifications cancelled");
        Ok(())
    }
}
