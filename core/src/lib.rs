//! # Banquet Core
//!
//! Domain types, state machines and storage traits for banquet-hall bookings
//! across multiple branches.
//!
//! ## Concepts
//!
//! - **Lead**: a prospective client moving through the sales funnel
//!   (`new → contacted → site_visit → tasting → negotiation → advance_paid`, or `lost`)
//! - **Checklist**: nine milestones per lead; `advance_payment` is the gate that
//!   converts the lead into a booking
//! - **Booking**: a confirmed reservation of a hall at a date and time
//! - **Conflict key**: `(branch, hall, date, time)`; at most one confirmed booking holds it
//! - **Occupancy**: derived per `(hall, date)` colour band for calendars
//! - **Change notification**: branch-scoped stream of committed changes
//!
//! ## Layering
//!
//! This crate holds no I/O. Services live in `banquet-runtime`, storage
//! backends implement [`repository::BanquetRepository`], and notification
//! transports implement [`notification::ChangeNotifier`].
//!
//! ## Example
//!
//! ```
//! use banquet_core::booking::BookingStatus;
//! use banquet_core::lead::LeadStatus;
//!
//! assert!(LeadStatus::Negotiation.can_update_to(LeadStatus::Lost));
//! assert!(!LeadStatus::Negotiation.can_update_to(LeadStatus::AdvancePaid));
//! assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Cancelled));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod booking;
pub mod checklist;
pub mod error;
pub mod lead;
pub mod notification;
pub mod occupancy;
pub mod repository;
pub mod types;

pub use booking::{Booking, BookingRequest, BookingStatus, Conflict, GST_PERCENT};
pub use checklist::{Checklist, ConversionTerms, Milestone, MilestoneState, MilestoneUpdate};
pub use error::{BookingError, Entity};
pub use lead::{FunnelStats, Lead, LeadStatus, NewLead};
pub use notification::{
    ChangeBatch, ChangeEvent, ChangeNotification, ChangeNotifier, NotifyError, Subscription,
    SubscriptionId,
};
pub use occupancy::{OccupancyCell, OccupancyLevel};
pub use repository::BanquetRepository;
pub use types::{
    BookingId, BranchId, ChecklistId, ConflictKey, ContactInfo, HallName, LeadId, Money,
    SalespersonId,
};

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Environment module - injected dependencies
///
/// Services take their dependencies through traits so tests can substitute
/// deterministic implementations.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use banquet_core::environment::{Clock, SystemClock};
    ///
    /// let now = SystemClock.now();
    /// assert!(now.timestamp() > 0);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
