//! Storage abstraction for leads, checklists and bookings.
//!
//! Mutations are expressed as closures that the repository applies to the
//! current record inside its own atomic section (a write lock, or a database
//! transaction with row locks). A closure that returns an error aborts the
//! mutation and nothing is written.
//!
//! # Slot uniqueness
//!
//! [`BanquetRepository::insert_booking`] and [`BanquetRepository::convert_lead`]
//! check the conflict key of a confirmed booking in the same atomic section as
//! the write. Implementations report a taken slot either as
//! [`BookingError::DoubleBooking`] (when they know the holder) or as
//! [`BookingError::ConstraintViolation`] (when a storage constraint caught it).

use crate::booking::{Booking, Conflict};
use crate::checklist::Checklist;
use crate::error::BookingError;
use crate::lead::{Lead, LeadStatus};
use crate::types::{BookingId, BranchId, ChecklistId, ConflictKey, HallName, LeadId};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by repository methods
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BookingError>> + Send + 'a>>;

/// Change applied to a stored lead
pub type LeadMutation = Box<dyn FnOnce(&mut Lead) -> Result<(), BookingError> + Send>;

/// Change applied to a stored checklist. Returns whether anything changed;
/// unchanged checklists are not written.
pub type ChecklistMutation = Box<dyn FnOnce(&mut Checklist) -> Result<bool, BookingError> + Send>;

/// Change applied to a stored booking
pub type BookingMutation = Box<dyn FnOnce(&mut Booking) -> Result<(), BookingError> + Send>;

/// The advance-payment conversion, applied to a lead and its checklist.
///
/// Returns the booking to insert, or `None` when the conversion already
/// happened and there is nothing to do.
pub type ConversionPlan = Box<
    dyn FnOnce(&mut Lead, &mut Checklist) -> Result<Option<Booking>, BookingError> + Send,
>;

/// A record before and after a mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Updated<T> {
    /// State before the mutation
    pub before: T,
    /// State after the mutation, as stored
    pub after: T,
}

/// What a conversion committed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// The lead after the conversion
    pub lead: Lead,
    /// The checklist after the conversion
    pub checklist: Checklist,
    /// The booking created, or `None` if the lead was already converted
    pub booking: Option<Booking>,
}

/// Persistence for the booking core.
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns so it can be used
/// as `Arc<dyn BanquetRepository>`.
pub trait BanquetRepository: Send + Sync {
    /// Stores a new lead together with its checklist.
    fn insert_lead(&self, lead: Lead, checklist: Checklist) -> RepoFuture<'_, ()>;

    /// Loads a lead.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown id.
    fn lead(&self, id: LeadId) -> RepoFuture<'_, Lead>;

    /// All leads of a branch, oldest first.
    fn leads_for_branch(&self, branch_id: BranchId) -> RepoFuture<'_, Vec<Lead>>;

    /// Applies `mutation` to a lead atomically.
    fn update_lead(&self, id: LeadId, mutation: LeadMutation) -> RepoFuture<'_, Updated<Lead>>;

    /// Loads a checklist.
    fn checklist(&self, id: ChecklistId) -> RepoFuture<'_, Checklist>;

    /// Loads the checklist owned by a lead.
    fn checklist_for_lead(&self, lead_id: LeadId) -> RepoFuture<'_, Checklist>;

    /// Applies `mutation` to a checklist atomically, writing only if it reports a change.
    fn update_checklist(
        &self,
        id: ChecklistId,
        mutation: ChecklistMutation,
    ) -> RepoFuture<'_, (Checklist, bool)>;

    /// Runs a conversion plan against a lead and its checklist, and inserts the
    /// booking it yields, all in one atomic section.
    ///
    /// On a slot conflict nothing is written.
    fn convert_lead(&self, lead_id: LeadId, plan: ConversionPlan)
    -> RepoFuture<'_, ConversionOutcome>;

    /// Inserts a booking. A confirmed booking is only inserted if its slot is free.
    fn insert_booking(&self, booking: Booking) -> RepoFuture<'_, Booking>;

    /// Loads a booking.
    fn booking(&self, id: BookingId) -> RepoFuture<'_, Booking>;

    /// Applies `mutation` to a booking atomically.
    fn update_booking(
        &self,
        id: BookingId,
        mutation: BookingMutation,
    ) -> RepoFuture<'_, Updated<Booking>>;

    /// The confirmed booking holding `key`, if any.
    fn find_conflict(&self, key: ConflictKey) -> RepoFuture<'_, Option<Conflict>>;

    /// Confirmed bookings of a branch within `from..=to`, optionally for one hall.
    fn confirmed_bookings(
        &self,
        branch_id: BranchId,
        hall: Option<HallName>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoFuture<'_, Vec<Booking>>;

    /// Bookings of any status within `from..=to`, ordered by date then time.
    fn bookings_for_branch(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoFuture<'_, Vec<Booking>>;

    /// Number of leads per status for a branch. Statuses with no leads may be omitted.
    fn lead_status_counts(&self, branch_id: BranchId) -> RepoFuture<'_, Vec<(LeadStatus, u64)>>;
}
