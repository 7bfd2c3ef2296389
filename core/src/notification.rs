//! Branch-scoped change notifications.
//!
//! Every committed lead, checklist or booking mutation is published to the
//! observers of the branch it belongs to. Observers are typically UI sessions
//! that keep a booking calendar or a lead board up to date.
//!
//! # Delivery
//!
//! ```text
//! ┌──────────────┐     commit      ┌──────────────┐
//! │   Service    │ ──────────────► │  Repository  │
//! └──────┬───────┘                 └──────────────┘
//!        │ publish(branch, batch)
//!        ▼
//! ┌──────────────┐   per-branch    ┌──────────────┐
//! │   Notifier   │ ──────────────► │ Subscription │ (one per observer)
//! └──────────────┘  sequence n+1   └──────────────┘
//! ```
//!
//! - Per-branch order equals commit order. Nothing is promised across branches.
//! - Publishing never blocks the writer. When `publish` returns, observers may
//!   not have seen the change yet.
//! - There is no backfill. An observer that falls behind receives
//!   [`NotifyError::Lagged`] and must re-query the state it displays.
//! - Dropping a [`Subscription`] (or calling
//!   [`ChangeNotifier::unsubscribe`]) stops delivery.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut subscription = notifier.subscribe(branch_id);
//! while let Some(item) = subscription.recv().await {
//!     match item {
//!         Ok(notification) => render(notification),
//!         Err(NotifyError::Lagged(_)) => reload_calendar().await?,
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! ```

use crate::booking::Booking;
use crate::checklist::Checklist;
use crate::lead::{Lead, LeadStatus};
use crate::types::{BookingId, BranchId, LeadId, Money};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

/// A committed change, carrying the changed record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A lead was captured
    LeadCreated {
        /// The new lead
        lead: Lead,
    },
    /// A lead moved through the funnel
    LeadStatusChanged {
        /// The lead after the change
        lead: Lead,
        /// Status before the change
        from: LeadStatus,
    },
    /// A checklist milestone changed
    ChecklistUpdated {
        /// The checklist after the change
        checklist: Checklist,
    },
    /// The advance payment converted a lead into a booking
    LeadConverted {
        /// Converted lead
        lead_id: LeadId,
        /// Booking created by the conversion
        booking_id: BookingId,
        /// Advance received
        amount: Money,
    },
    /// A booking was confirmed
    BookingCreated {
        /// The new booking
        booking: Booking,
    },
    /// A booking's status or amounts changed
    BookingUpdated {
        /// The booking after the change
        booking: Booking,
    },
}

impl ChangeEvent {
    /// Versioned event type name
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::LeadCreated { .. } => "LeadCreated.v1",
            Self::LeadStatusChanged { .. } => "LeadStatusChanged.v1",
            Self::ChecklistUpdated { .. } => "ChecklistUpdated.v1",
            Self::LeadConverted { .. } => "LeadConverted.v1",
            Self::BookingCreated { .. } => "BookingCreated.v1",
            Self::BookingUpdated { .. } => "BookingUpdated.v1",
        }
    }
}

/// The events one commit produces, in the order they happened.
///
/// Most commits produce one event; a conversion produces four.
pub type ChangeBatch = SmallVec<[ChangeEvent; 4]>;

/// A change as delivered to observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Branch the change belongs to
    pub branch_id: BranchId,
    /// Position in the branch's notification sequence, starting at 1
    pub sequence: u64,
    /// Commit time
    pub occurred_at: DateTime<Utc>,
    /// What changed
    pub event: ChangeEvent,
}

impl ChangeNotification {
    /// Serializes the notification for a push transport.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, NotifyError> {
        serde_json::to_string(self).map_err(|e| NotifyError::Serialization(e.to_string()))
    }
}

/// Errors seen by observers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The observer fell behind and `n` notifications were dropped for it
    #[error("Subscriber lagged behind; {0} notifications skipped")]
    Lagged(u64),

    /// The notifier shut down
    #[error("Notification channel closed")]
    Closed,

    /// Encoding a notification failed
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Stream of notifications for one observer
pub type ChangeStream =
    Pin<Box<dyn Stream<Item = Result<ChangeNotification, NotifyError>> + Send>>;

/// Identifies one subscription within a notifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wraps a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One observer's live view of a branch.
///
/// Ends (yields `None`) after [`ChangeNotifier::unsubscribe`] or when the
/// notifier is dropped. Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriptionId,
    branch_id: BranchId,
    stream: ChangeStream,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Assembles a subscription. `release` runs once, when the subscription is dropped.
    #[must_use]
    pub fn new(
        id: SubscriptionId,
        branch_id: BranchId,
        stream: ChangeStream,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            branch_id,
            stream,
            release: Some(Box::new(release)),
        }
    }

    /// Subscription id, for [`ChangeNotifier::unsubscribe`]
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Branch being observed
    #[must_use]
    pub const fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    /// Waits for the next notification. `None` means the subscription ended.
    pub async fn recv(&mut self) -> Option<Result<ChangeNotification, NotifyError>> {
        self.stream.next().await
    }
}

impl Stream for Subscription {
    type Item = Result<ChangeNotification, NotifyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("branch_id", &self.branch_id)
            .finish_non_exhaustive()
    }
}

/// Publish/subscribe transport for change notifications.
///
/// Implementations must be cheap to call from inside a write path: `publish`
/// must not wait on observers.
pub trait ChangeNotifier: Send + Sync {
    /// Publishes the events of one commit to the branch's observers, assigning
    /// each the next sequence number.
    ///
    /// Returns the number of observers the batch was handed to.
    fn publish(&self, branch_id: BranchId, batch: ChangeBatch, occurred_at: DateTime<Utc>)
    -> usize;

    /// Starts observing a branch. Only changes published afterwards are delivered.
    fn subscribe(&self, branch_id: BranchId) -> Subscription;

    /// Stops a subscription. Returns `false` if it was not active.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Number of active subscriptions for a branch
    fn subscriber_count(&self, branch_id: BranchId) -> usize;
}
