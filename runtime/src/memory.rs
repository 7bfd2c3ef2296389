//! In-memory repository.
//!
//! All tables sit behind one [`tokio::sync::RwLock`]. Every mutation,
//! including the slot check that guards confirmed bookings, runs under a
//! single write guard, so check and insert cannot interleave.
//!
//! Confirmed bookings are indexed by [`ConflictKey`]; the index is the
//! in-process counterpart of the partial unique index used by the Postgres
//! backend.

use banquet_core::booking::{Booking, Conflict};
use banquet_core::checklist::Checklist;
use banquet_core::error::{BookingError, Entity};
use banquet_core::lead::{Lead, LeadStatus};
use banquet_core::repository::{
    BanquetRepository, BookingMutation, ChecklistMutation, ConversionOutcome, ConversionPlan,
    LeadMutation, RepoFuture, Updated,
};
use banquet_core::types::{BookingId, BranchId, ChecklistId, ConflictKey, HallName, LeadId};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    leads: HashMap<LeadId, Lead>,
    checklists: HashMap<ChecklistId, Checklist>,
    checklist_by_lead: HashMap<LeadId, ChecklistId>,
    bookings: HashMap<BookingId, Booking>,
    slots: HashMap<ConflictKey, BookingId>,
}

impl Tables {
    fn lead(&self, id: LeadId) -> Result<&Lead, BookingError> {
        self.leads
            .get(&id)
            .ok_or_else(|| BookingError::not_found(Entity::Lead, id))
    }

    fn checklist(&self, id: ChecklistId) -> Result<&Checklist, BookingError> {
        self.checklists
            .get(&id)
            .ok_or_else(|| BookingError::not_found(Entity::Checklist, id))
    }

    fn checklist_id_for(&self, lead_id: LeadId) -> Result<ChecklistId, BookingError> {
        self.checklist_by_lead
            .get(&lead_id)
            .copied()
            .ok_or_else(|| BookingError::not_found(Entity::Checklist, lead_id))
    }

    fn booking(&self, id: BookingId) -> Result<&Booking, BookingError> {
        self.bookings
            .get(&id)
            .ok_or_else(|| BookingError::not_found(Entity::Booking, id))
    }

    /// The confirmed booking holding `key`, other than `except`
    fn holder(&self, key: &ConflictKey, except: Option<BookingId>) -> Option<Conflict> {
        self.slots
            .get(key)
            .filter(|id| Some(**id) != except)
            .and_then(|id| self.bookings.get(id))
            .map(Conflict::with)
    }

    fn ensure_slot_free(&self, booking: &Booking) -> Result<(), BookingError> {
        if !booking.status.holds_slot() {
            return Ok(());
        }
        match self.holder(&booking.conflict_key(), Some(booking.id)) {
            Some(conflict) => Err(BookingError::DoubleBooking(conflict)),
            None => Ok(()),
        }
    }

    /// Stores `booking`, keeping the slot index in step with its status.
    /// Callers must have run [`Tables::ensure_slot_free`].
    fn put_booking(&mut self, booking: Booking) {
        if let Some(previous) = self.bookings.get(&booking.id) {
            let previous_key = previous.conflict_key();
            if self.slots.get(&previous_key) == Some(&booking.id) {
                self.slots.remove(&previous_key);
            }
        }
        if booking.status.holds_slot() {
            self.slots.insert(booking.conflict_key(), booking.id);
        }
        self.bookings.insert(booking.id, booking);
    }
}

/// Process-local [`BanquetRepository`].
///
/// Suitable for tests, demos and single-process deployments. State is lost
/// when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    /// Creates an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_range(date: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    from <= date && date <= to
}

fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        (a.event_date, a.event_time, &a.hall, a.created_at)
            .cmp(&(b.event_date, b.event_time, &b.hall, b.created_at))
    });
}

impl BanquetRepository for InMemoryRepository {
    fn insert_lead(&self, lead: Lead, checklist: Checklist) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables.leads.contains_key(&lead.id) {
                return Err(BookingError::Storage(format!("Lead {} already exists", lead.id)));
            }
            tables.checklist_by_lead.insert(lead.id, checklist.id);
            tables.checklists.insert(checklist.id, checklist);
            tables.leads.insert(lead.id, lead);
            Ok(())
        })
    }

    fn lead(&self, id: LeadId) -> RepoFuture<'_, Lead> {
        Box::pin(async move { self.tables.read().await.lead(id).cloned() })
    }

    fn leads_for_branch(&self, branch_id: BranchId) -> RepoFuture<'_, Vec<Lead>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut leads: Vec<Lead> = tables
                .leads
                .values()
                .filter(|lead| lead.branch_id == branch_id)
                .cloned()
                .collect();
            leads.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
            Ok(leads)
        })
    }

    fn update_lead(&self, id: LeadId, mutation: LeadMutation) -> RepoFuture<'_, Updated<Lead>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let before = tables.lead(id)?.clone();
            let mut after = before.clone();
            mutation(&mut after)?;
            tables.leads.insert(id, after.clone());
            Ok(Updated { before, after })
        })
    }

    fn checklist(&self, id: ChecklistId) -> RepoFuture<'_, Checklist> {
        Box::pin(async move { self.tables.read().await.checklist(id).cloned() })
    }

    fn checklist_for_lead(&self, lead_id: LeadId) -> RepoFuture<'_, Checklist> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let id = tables.checklist_id_for(lead_id)?;
            tables.checklist(id).cloned()
        })
    }

    fn update_checklist(
        &self,
        id: ChecklistId,
        mutation: ChecklistMutation,
    ) -> RepoFuture<'_, (Checklist, bool)> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let mut checklist = tables.checklist(id)?.clone();
            let changed = mutation(&mut checklist)?;
            if changed {
                tables.checklists.insert(id, checklist.clone());
            }
            Ok((checklist, changed))
        })
    }

    fn convert_lead(
        &self,
        lead_id: LeadId,
        plan: ConversionPlan,
    ) -> RepoFuture<'_, ConversionOutcome> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let mut lead = tables.lead(lead_id)?.clone();
            let checklist_id = tables.checklist_id_for(lead_id)?;
            let mut checklist = tables.checklist(checklist_id)?.clone();

            let booking = plan(&mut lead, &mut checklist)?;
            if let Some(booking) = &booking {
                tables.ensure_slot_free(booking)?;
                tables.put_booking(booking.clone());
            }
            tables.leads.insert(lead_id, lead.clone());
            tables.checklists.insert(checklist_id, checklist.clone());

            Ok(ConversionOutcome {
                lead,
                checklist,
                booking,
            })
        })
    }

    fn insert_booking(&self, booking: Booking) -> RepoFuture<'_, Booking> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            if tables.bookings.contains_key(&booking.id) {
                return Err(BookingError::Storage(format!(
                    "Booking {} already exists",
                    booking.id
                )));
            }
            tables.ensure_slot_free(&booking)?;
            tables.put_booking(booking.clone());
            Ok(booking)
        })
    }

    fn booking(&self, id: BookingId) -> RepoFuture<'_, Booking> {
        Box::pin(async move { self.tables.read().await.booking(id).cloned() })
    }

    fn update_booking(
        &self,
        id: BookingId,
        mutation: BookingMutation,
    ) -> RepoFuture<'_, Updated<Booking>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let before = tables.booking(id)?.clone();
            let mut after = before.clone();
            mutation(&mut after)?;
            tables.ensure_slot_free(&after)?;
            tables.put_booking(after.clone());
            Ok(Updated { before, after })
        })
    }

    fn find_conflict(&self, key: ConflictKey) -> RepoFuture<'_, Option<Conflict>> {
        Box::pin(async move { Ok(self.tables.read().await.holder(&key, None)) })
    }

    fn confirmed_bookings(
        &self,
        branch_id: BranchId,
        hall: Option<HallName>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut bookings: Vec<Booking> = tables
                .bookings
                .values()
                .filter(|b| b.branch_id == branch_id && b.status.holds_slot())
                .filter(|b| in_range(b.event_date, from, to))
                .filter(|b| hall.as_ref().is_none_or(|hall| &b.hall == hall))
                .cloned()
                .collect();
            sort_bookings(&mut bookings);
            Ok(bookings)
        })
    }

    fn bookings_for_branch(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut bookings: Vec<Booking> = tables
                .bookings
                .values()
                .filter(|b| b.branch_id == branch_id && in_range(b.event_date, from, to))
                .cloned()
                .collect();
            sort_bookings(&mut bookings);
            Ok(bookings)
        })
    }

    fn lead_status_counts(&self, branch_id: BranchId) -> RepoFuture<'_, Vec<(LeadStatus, u64)>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut counts: BTreeMap<LeadStatus, u64> = BTreeMap::new();
            for lead in tables.leads.values().filter(|l| l.branch_id == branch_id) {
                *counts.entry(lead.status).or_default() += 1;
            }
            Ok(counts.into_iter().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use banquet_core::booking::{BookingRequest, BookingStatus};
    use banquet_core::types::{ContactInfo, Money};
    use chrono::{NaiveTime, TimeZone, Utc};

    fn booking(branch_id: BranchId, hour: u32) -> Booking {
        BookingRequest {
            branch_id,
            hall: HallName::new("Grand Ballroom").unwrap(),
            event_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            event_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            guest_count: 200,
            total_amount: Money::from_rupees(500_000),
            advance_amount: Money::from_rupees(100_000),
            client: ContactInfo::new("Client", "1"),
        }
        .into_booking(
            BookingId::new(),
            None,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_slot() {
        let repo = InMemoryRepository::new();
        let branch = BranchId::new();
        let first = repo.insert_booking(booking(branch, 18)).await.unwrap();

        let err = repo.insert_booking(booking(branch, 18)).await.unwrap_err();
        assert_eq!(err.conflict().map(|c| c.booking_id), Some(first.id));

        assert!(repo.insert_booking(booking(branch, 12)).await.is_ok());
        assert!(repo.insert_booking(booking(BranchId::new(), 18)).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelling_releases_slot() {
        let repo = InMemoryRepository::new();
        let branch = BranchId::new();
        let first = repo.insert_booking(booking(branch, 18)).await.unwrap();
        let at = first.created_at;

        repo.update_booking(
            first.id,
            Box::new(move |b: &mut Booking| b.transition_to(BookingStatus::Cancelled, at)),
        )
        .await
        .unwrap();

        assert!(repo.find_conflict(first.conflict_key()).await.unwrap().is_none());
        assert!(repo.insert_booking(booking(branch, 18)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let repo = InMemoryRepository::new();
        let first = repo.insert_booking(booking(BranchId::new(), 18)).await.unwrap();

        let result = repo
            .update_booking(
                first.id,
                Box::new(|b: &mut Booking| {
                    b.guest_count = 1;
                    Err(BookingError::Validation("nope".to_string()))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(repo.booking(first.id).await.unwrap().guest_count, 200);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.booking(BookingId::new()).await,
            Err(BookingError::NotFound { entity: Entity::Booking, .. })
        ));
        assert!(matches!(
            repo.lead(LeadId::new()).await,
            Err(BookingError::NotFound { entity: Entity::Lead, .. })
        ));
    }
}
