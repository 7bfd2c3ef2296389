//! Branch-scoped change fan-out over tokio broadcast channels.
//!
//! Each branch gets its own [`broadcast`] channel and sequence counter. A
//! subscription pairs a broadcast receiver with a [`watch`] cancel signal;
//! dropping the signal's sender (on unsubscribe, on drop of the
//! [`Subscription`], or when the notifier goes away) ends the stream.
//!
//! Slow observers do not hold up writers: once an observer is more than the
//! channel capacity behind, the oldest notifications are dropped for it and it
//! receives [`NotifyError::Lagged`].

use banquet_core::notification::{
    ChangeBatch, ChangeNotification, ChangeNotifier, ChangeStream, NotifyError, Subscription,
    SubscriptionId,
};
use banquet_core::types::BranchId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use crate::config::DEFAULT_NOTIFY_CAPACITY;

struct BranchChannel {
    sender: broadcast::Sender<ChangeNotification>,
    sequence: u64,
}

struct Registration {
    branch_id: BranchId,
    // Dropping this ends the subscription's stream
    _cancel: watch::Sender<()>,
}

#[derive(Default)]
struct Registry {
    branches: HashMap<BranchId, BranchChannel>,
    subscriptions: HashMap<SubscriptionId, Registration>,
    next_id: u64,
}

/// [`ChangeNotifier`] backed by one tokio broadcast channel per branch.
pub struct BroadcastNotifier {
    capacity: usize,
    registry: Arc<Mutex<Registry>>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` notifications per branch.
    ///
    /// A zero capacity is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_CAPACITY)
    }
}

impl std::fmt::Debug for BroadcastNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("BroadcastNotifier")
            .field("capacity", &self.capacity)
            .field("branches", &registry.branches.len())
            .field("subscriptions", &registry.subscriptions.len())
            .finish()
    }
}

// The registry holds no invariant a panicking holder could break halfway.
fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release(registry: &Weak<Mutex<Registry>>, id: SubscriptionId) -> bool {
    registry
        .upgrade()
        .is_some_and(|registry| lock(&registry).subscriptions.remove(&id).is_some())
}

fn notification_stream(
    receiver: broadcast::Receiver<ChangeNotification>,
    cancel: watch::Receiver<()>,
) -> ChangeStream {
    Box::pin(futures::stream::unfold(
        (receiver, cancel),
        |(mut receiver, mut cancel)| async move {
            let item = tokio::select! {
                biased;
                _ = cancel.changed() => return None,
                received = receiver.recv() => match received {
                    Ok(notification) => Ok(notification),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Change observer lagged, {} notifications skipped", skipped);
                        metrics::counter!("banquet.notifications.lagged").increment(skipped);
                        Err(NotifyError::Lagged(skipped))
                    }
                    Err(RecvError::Closed) => return None,
                },
            };
            Some((item, (receiver, cancel)))
        },
    ))
}

impl ChangeNotifier for BroadcastNotifier {
    fn publish(
        &self,
        branch_id: BranchId,
        batch: ChangeBatch,
        occurred_at: DateTime<Utc>,
    ) -> usize {
        let capacity = self.capacity;
        let mut registry = self.registry();
        let channel = registry
            .branches
            .entry(branch_id)
            .or_insert_with(|| BranchChannel {
                sender: broadcast::channel(capacity).0,
                sequence: 0,
            });

        let mut delivered = 0;
        for event in batch {
            channel.sequence += 1;
            let event_type = event.event_type();
            let notification = ChangeNotification {
                branch_id,
                sequence: channel.sequence,
                occurred_at,
                event,
            };
            // No receivers is not an error: nobody is watching this branch
            let receivers = channel.sender.send(notification).unwrap_or(0);
            delivered = delivered.max(receivers);

            tracing::debug!(
                branch_id = %branch_id,
                sequence = channel.sequence,
                event_type,
                receivers,
                "Published change notification"
            );
            metrics::counter!("banquet.notifications.published", "event_type" => event_type)
                .increment(1);
        }
        delivered
    }

    fn subscribe(&self, branch_id: BranchId) -> Subscription {
        let capacity = self.capacity;
        let mut registry = self.registry();

        registry.next_id += 1;
        let id = SubscriptionId::new(registry.next_id);

        let receiver = registry
            .branches
            .entry(branch_id)
            .or_insert_with(|| BranchChannel {
                sender: broadcast::channel(capacity).0,
                sequence: 0,
            })
            .sender
            .subscribe();

        let (cancel_tx, cancel_rx) = watch::channel(());
        registry.subscriptions.insert(
            id,
            Registration {
                branch_id,
                _cancel: cancel_tx,
            },
        );
        drop(registry);

        tracing::debug!(branch_id = %branch_id, subscription = %id, "Observer subscribed");

        let weak = Arc::downgrade(&self.registry);
        Subscription::new(
            id,
            branch_id,
            notification_stream(receiver, cancel_rx),
            move || {
                release(&weak, id);
            },
        )
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry().subscriptions.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "Observer unsubscribed");
        }
        removed
    }

    fn subscriber_count(&self, branch_id: BranchId) -> usize {
        self.registry()
            .subscriptions
            .values()
            .filter(|registration| registration.branch_id == branch_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use banquet_core::notification::ChangeEvent;
    use banquet_core::types::{BookingId, LeadId, Money};
    use smallvec::smallvec;

    fn converted() -> ChangeEvent {
        ChangeEvent::LeadConverted {
            lead_id: LeadId::new(),
            booking_id: BookingId::new(),
            amount: Money::from_rupees(1),
        }
    }

    #[tokio::test]
    async fn test_sequence_numbers_follow_publish_order() {
        let notifier = BroadcastNotifier::new(16);
        let branch = BranchId::new();
        let mut subscription = notifier.subscribe(branch);

        notifier.publish(branch, smallvec![converted(), converted()], Utc::now());
        notifier.publish(branch, smallvec![converted()], Utc::now());

        for expected in 1..=3 {
            let notification = subscription.recv().await.unwrap().unwrap();
            assert_eq!(notification.sequence, expected);
            assert_eq!(notification.branch_id, branch);
        }
    }

    #[tokio::test]
    async fn test_publish_without_observers_is_fine() {
        let notifier = BroadcastNotifier::new(4);
        assert_eq!(notifier.publish(BranchId::new(), smallvec![converted()], Utc::now()), 0);
    }

    #[tokio::test]
    async fn test_lagging_observer_gets_lagged_signal() {
        let notifier = BroadcastNotifier::new(2);
        let branch = BranchId::new();
        let mut subscription = notifier.subscribe(branch);

        for _ in 0..5 {
            notifier.publish(branch, smallvec![converted()], Utc::now());
        }

        assert!(matches!(
            subscription.recv().await,
            Some(Err(NotifyError::Lagged(3)))
        ));
        assert_eq!(subscription.recv().await.unwrap().unwrap().sequence, 4);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop_release_registration() {
        let notifier = BroadcastNotifier::new(4);
        let branch = BranchId::new();
        let mut first = notifier.subscribe(branch);
        let second = notifier.subscribe(branch);
        assert_eq!(notifier.subscriber_count(branch), 2);

        assert!(notifier.unsubscribe(first.id()));
        assert!(!notifier.unsubscribe(first.id()));
        assert!(first.recv().await.is_none());

        drop(second);
        assert_eq!(notifier.subscriber_count(branch), 0);
    }
}
