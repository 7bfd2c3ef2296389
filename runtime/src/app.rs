//! The `BanquetCore` facade: every booking-core operation behind one handle.

use banquet_core::booking::{Booking, BookingRequest, BookingStatus, Conflict};
use banquet_core::checklist::{Checklist, MilestoneUpdate};
use banquet_core::error::BookingError;
use banquet_core::lead::{FunnelStats, Lead, LeadStatus, NewLead};
use banquet_core::notification::{Subscription, SubscriptionId};
use banquet_core::occupancy::{OccupancyCell, OccupancyLevel};
use banquet_core::types::{BookingId, BranchId, ChecklistId, HallName, LeadId, Money};
use chrono::{NaiveDate, NaiveTime};

use crate::checklist::{ChecklistEngine, MilestoneOutcome};
use crate::conflict::ConflictDetector;
use crate::environment::BanquetEnvironment;
use crate::leads::LeadDesk;
use crate::lifecycle::BookingLifecycle;

/// Entry point for callers (UI or API layers).
///
/// Cheap to clone; clones share storage, fan-out and branch gates.
///
/// # Example
///
/// ```
/// use banquet_runtime::BanquetCore;
/// use banquet_core::{BookingRequest, BranchId, ContactInfo, HallName, Money};
/// use banquet_core::types::parse_event_time;
/// use chrono::NaiveDate;
///
/// # async fn example() -> Result<(), banquet_core::BookingError> {
/// let core = BanquetCore::in_memory();
/// let event_date = NaiveDate::from_ymd_opt(2025, 3, 10).ok_or_else(|| {
///     banquet_core::BookingError::Validation("bad date".to_string())
/// })?;
/// let booking = core
///     .create_booking(BookingRequest {
///         branch_id: BranchId::new(),
///         hall: HallName::new("Grand Ballroom")?,
///         event_date,
///         event_time: parse_event_time("18:00")?,
///         guest_count: 200,
///         total_amount: Money::from_rupees(500_000),
///         advance_amount: Money::from_rupees(100_000),
///         client: ContactInfo::new("Asha Rao", "9800000000"),
///     })
///     .await?;
/// assert_eq!(booking.balance_amount, Money::from_rupees(400_000));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BanquetCore {
    env: BanquetEnvironment,
    leads: LeadDesk,
    checklists: ChecklistEngine,
    bookings: BookingLifecycle,
    conflicts: ConflictDetector,
}

impl BanquetCore {
    /// Wires the services over `env`
    #[must_use]
    pub fn new(env: BanquetEnvironment) -> Self {
        Self {
            leads: LeadDesk::new(env.clone()),
            checklists: ChecklistEngine::new(env.clone()),
            bookings: BookingLifecycle::new(env.clone()),
            conflicts: ConflictDetector::new(env.clone()),
            env,
        }
    }

    /// In-memory storage with the system clock
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(BanquetEnvironment::in_memory())
    }

    /// The shared environment
    #[must_use]
    pub const fn environment(&self) -> &BanquetEnvironment {
        &self.env
    }

    // ------------------------------------------------------------------
    // Leads
    // ------------------------------------------------------------------

    /// See [`LeadDesk::create_lead`].
    ///
    /// # Errors
    ///
    /// See [`LeadDesk::create_lead`].
    pub async fn create_lead(&self, new_lead: NewLead) -> Result<Lead, BookingError> {
        self.leads.create_lead(new_lead).await
    }

    /// See [`LeadDesk::update_lead_status`].
    ///
    /// # Errors
    ///
    /// See [`LeadDesk::update_lead_status`].
    pub async fn update_lead_status(
        &self,
        lead_id: LeadId,
        status: LeadStatus,
    ) -> Result<Lead, BookingError> {
        self.leads.update_lead_status(lead_id, status).await
    }

    /// See [`LeadDesk::get_lead`].
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown lead.
    pub async fn get_lead(&self, lead_id: LeadId) -> Result<Lead, BookingError> {
        self.leads.get_lead(lead_id).await
    }

    /// See [`LeadDesk::leads_for_branch`].
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    pub async fn leads_for_branch(&self, branch_id: BranchId) -> Result<Vec<Lead>, BookingError> {
        self.leads.leads_for_branch(branch_id).await
    }

    /// See [`LeadDesk::funnel`].
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    pub async fn funnel(&self, branch_id: BranchId) -> Result<FunnelStats, BookingError> {
        self.leads.funnel(branch_id).await
    }

    // ------------------------------------------------------------------
    // Checklists
    // ------------------------------------------------------------------

    /// See [`ChecklistEngine::complete_milestone`].
    ///
    /// # Errors
    ///
    /// See [`ChecklistEngine::complete_milestone`].
    pub async fn complete_milestone(
        &self,
        checklist_id: ChecklistId,
        update: MilestoneUpdate,
    ) -> Result<MilestoneOutcome, BookingError> {
        self.checklists.complete_milestone(checklist_id, update).await
    }

    /// See [`ChecklistEngine::get_checklist`].
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown checklist.
    pub async fn get_checklist(&self, checklist_id: ChecklistId) -> Result<Checklist, BookingError> {
        self.checklists.get_checklist(checklist_id).await
    }

    /// See [`ChecklistEngine::checklist_for_lead`].
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown lead.
    pub async fn checklist_for_lead(&self, lead_id: LeadId) -> Result<Checklist, BookingError> {
        self.checklists.checklist_for_lead(lead_id).await
    }

    // ------------------------------------------------------------------
    // Conflicts and occupancy
    // ------------------------------------------------------------------

    /// See [`ConflictDetector::check_conflict`].
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    pub async fn check_conflict(
        &self,
        branch_id: BranchId,
        hall: &HallName,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Conflict>, BookingError> {
        self.conflicts.check_conflict(branch_id, hall, date, time).await
    }

    /// See [`ConflictDetector::classify`].
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    pub async fn classify(
        &self,
        branch_id: BranchId,
        hall: &HallName,
        date: NaiveDate,
    ) -> Result<OccupancyLevel, BookingError> {
        self.conflicts.classify(branch_id, hall, date).await
    }

    /// See [`ConflictDetector::occupancy_calendar`].
    ///
    /// # Errors
    ///
    /// See [`ConflictDetector::occupancy_calendar`].
    pub async fn occupancy_calendar(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OccupancyCell>, BookingError> {
        self.conflicts.occupancy_calendar(branch_id, from, to).await
    }

    /// See [`ConflictDetector::overbooked_cells`].
    ///
    /// # Errors
    ///
    /// See [`ConflictDetector::occupancy_calendar`].
    pub async fn overbooked_cells(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OccupancyCell>, BookingError> {
        self.conflicts.overbooked_cells(branch_id, from, to).await
    }

    // ------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------

    /// See [`BookingLifecycle::create_booking`].
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::create_booking`].
    pub async fn create_booking(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        self.bookings.create_booking(request).await
    }

    /// See [`BookingLifecycle::convert_lead_to_booking`].
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::convert_lead_to_booking`].
    pub async fn convert_lead_to_booking(
        &self,
        lead_id: LeadId,
        hall: HallName,
        event_time: NaiveTime,
        advance: Money,
        total: Money,
    ) -> Result<Booking, BookingError> {
        self.bookings
            .convert_lead_to_booking(lead_id, hall, event_time, advance, total)
            .await
    }

    /// See [`BookingLifecycle::update_booking_status`].
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::update_booking_status`].
    pub async fn update_booking_status(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, BookingError> {
        self.bookings.update_booking_status(booking_id, status).await
    }

    /// See [`BookingLifecycle::record_payment`].
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::record_payment`].
    pub async fn record_payment(
        &self,
        booking_id: BookingId,
        amount: Money,
    ) -> Result<Booking, BookingError> {
        self.bookings.record_payment(booking_id, amount).await
    }

    /// See [`BookingLifecycle::revise_total`].
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::revise_total`].
    pub async fn revise_total(
        &self,
        booking_id: BookingId,
        new_total: Money,
    ) -> Result<Booking, BookingError> {
        self.bookings.revise_total(booking_id, new_total).await
    }

    /// See [`BookingLifecycle::get_booking`].
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown booking.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.bookings.get_booking(booking_id).await
    }

    /// See [`BookingLifecycle::bookings_for_branch`].
    ///
    /// # Errors
    ///
    /// See [`BookingLifecycle::bookings_for_branch`].
    pub async fn bookings_for_branch(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, BookingError> {
        self.bookings.bookings_for_branch(branch_id, from, to).await
    }

    // ------------------------------------------------------------------
    // Change notifications
    // ------------------------------------------------------------------

    /// Observes committed changes of one branch
    #[must_use]
    pub fn subscribe(&self, branch_id: BranchId) -> Subscription {
        self.env.notifier.subscribe(branch_id)
    }

    /// Ends a subscription. Returns `false` if it was not active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.env.notifier.unsubscribe(id)
    }
}
