//! Dependencies shared by the booking services.

use banquet_core::booking::Conflict;
use banquet_core::environment::{Clock, SystemClock};
use banquet_core::error::BookingError;
use banquet_core::notification::{ChangeBatch, ChangeNotifier};
use banquet_core::repository::BanquetRepository;
use banquet_core::types::BranchId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::fanout::BroadcastNotifier;
use crate::memory::InMemoryRepository;

/// One async mutex per branch.
///
/// Services hold a branch's gate from the storage commit until the change is
/// published, so notifications of a branch leave in commit order. Branches do
/// not contend with each other.
#[derive(Debug, Default)]
pub struct BranchGates {
    gates: Mutex<HashMap<BranchId, Arc<tokio::sync::Mutex<()>>>>,
}

impl BranchGates {
    /// Creates an empty gate table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `branch_id`
    pub async fn enter(&self, branch_id: BranchId) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(gates.entry(branch_id).or_default())
        };
        gate.lock_owned().await
    }
}

/// Environment injected into every service.
#[derive(Clone)]
pub struct BanquetEnvironment {
    /// Storage backend
    pub repository: Arc<dyn BanquetRepository>,
    /// Change fan-out
    pub notifier: Arc<dyn ChangeNotifier>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Per-branch commit gates
    pub gates: Arc<BranchGates>,
}

impl BanquetEnvironment {
    /// Creates an environment from its parts
    #[must_use]
    pub fn new(
        repository: Arc<dyn BanquetRepository>,
        notifier: Arc<dyn ChangeNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            notifier,
            clock,
            gates: Arc::new(BranchGates::new()),
        }
    }

    /// In-memory storage, broadcast fan-out and the system clock
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(BroadcastNotifier::default()),
            Arc::new(SystemClock),
        )
    }

    /// Publishes a committed batch for `branch_id` stamped with the current time.
    pub(crate) fn publish(&self, branch_id: BranchId, batch: ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        let receivers = self.notifier.publish(branch_id, batch, self.clock.now());
        tracing::trace!(branch_id = %branch_id, receivers, "Change batch published");
    }

    /// Turns a storage-level slot violation into a [`BookingError::DoubleBooking`]
    /// naming the booking that holds the slot.
    pub(crate) async fn resolve_slot_error(&self, error: BookingError) -> BookingError {
        let BookingError::ConstraintViolation(key) = error else {
            return error;
        };
        match self.repository.find_conflict(key.clone()).await {
            Ok(Some(conflict)) => BookingError::DoubleBooking(conflict),
            Ok(None) => BookingError::ConstraintViolation(key),
            Err(lookup) => {
                tracing::warn!(error = %lookup, slot = %key, "Could not look up slot holder");
                BookingError::ConstraintViolation(key)
            }
        }
    }
}

impl std::fmt::Debug for BanquetEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BanquetEnvironment").finish_non_exhaustive()
    }
}

/// Records a rejected slot in logs and metrics
pub(crate) fn record_conflict(conflict: Option<&Conflict>) {
    metrics::counter!("banquet.bookings.conflicts").increment(1);
    if let Some(conflict) = conflict {
        tracing::info!(
            holder = %conflict.booking_id,
            slot = %conflict.key,
            "Slot already booked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_branch_gate_is_exclusive() {
        let gates = Arc::new(BranchGates::new());
        let branch = BranchId::new();
        let held = gates.enter(branch).await;

        let contender = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                let _guard = gates.enter(branch).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // Other branches are not blocked
        let _other = gates.enter(BranchId::new()).await;

        drop(held);
        assert!(contender.await.is_ok());
    }
}
