//! Conflict detection and occupancy classification.
//!
//! A slot is `(branch, hall, date, start time)`. Two confirmed bookings
//! collide only when all four match exactly. Hall names are trimmed on
//! construction and otherwise compared as written.
//!
//! # Known limitation
//!
//! Start times are compared for equality, not as intervals. A booking at
//! 18:00 and another at 19:00 in the same hall on the same day are both
//! accepted even though the events would overlap. Such days show up as
//! [`OccupancyLevel::Overbooked`] in the calendar, which is the signal staff
//! act on.

use banquet_core::booking::Conflict;
use banquet_core::error::BookingError;
use banquet_core::occupancy::{OccupancyCell, OccupancyLevel, build_calendar};
use banquet_core::types::{BranchId, ConflictKey, HallName};
use chrono::{NaiveDate, NaiveTime};

use crate::environment::BanquetEnvironment;

/// Read-only slot checks and calendar classification
#[derive(Clone, Debug)]
pub struct ConflictDetector {
    env: BanquetEnvironment,
}

impl ConflictDetector {
    /// Creates a detector over the environment's repository
    #[must_use]
    pub const fn new(env: BanquetEnvironment) -> Self {
        Self { env }
    }

    /// The confirmed booking already holding the slot, if any.
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    #[tracing::instrument(skip(self, hall), fields(hall = %hall))]
    pub async fn check_conflict(
        &self,
        branch_id: BranchId,
        hall: &HallName,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<Conflict>, BookingError> {
        let key = ConflictKey::new(branch_id, hall.clone(), date, time);
        let conflict = self.env.repository.find_conflict(key).await?;
        if let Some(conflict) = &conflict {
            tracing::debug!(holder = %conflict.booking_id, "Slot is taken");
        }
        Ok(conflict)
    }

    /// Classifies a hall's day by the number of confirmed bookings, whatever their times.
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    #[tracing::instrument(skip(self, hall), fields(hall = %hall))]
    pub async fn classify(
        &self,
        branch_id: BranchId,
        hall: &HallName,
        date: NaiveDate,
    ) -> Result<OccupancyLevel, BookingError> {
        let bookings = self
            .env
            .repository
            .confirmed_bookings(branch_id, Some(hall.clone()), date, date)
            .await?;
        Ok(OccupancyLevel::from_count(bookings.len()))
    }

    /// Every `(hall, date)` cell with at least one confirmed booking in `from..=to`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] if `from` is after `to`
    /// - [`BookingError::Storage`] if the repository fails
    pub async fn occupancy_calendar(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OccupancyCell>, BookingError> {
        if from > to {
            return Err(BookingError::Validation(format!(
                "Range start {from} is after its end {to}"
            )));
        }
        let bookings = self
            .env
            .repository
            .confirmed_bookings(branch_id, None, from, to)
            .await?;
        Ok(build_calendar(&bookings))
    }

    /// Only the overbooked cells of [`ConflictDetector::occupancy_calendar`].
    ///
    /// # Errors
    ///
    /// Same as [`ConflictDetector::occupancy_calendar`].
    pub async fn overbooked_cells(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OccupancyCell>, BookingError> {
        let mut cells = self.occupancy_calendar(branch_id, from, to).await?;
        cells.retain(|cell| cell.level == OccupancyLevel::Overbooked);
        if !cells.is_empty() {
            tracing::warn!(branch_id = %branch_id, count = cells.len(), "Overbooked hall days found");
        }
        Ok(cells)
    }
}
