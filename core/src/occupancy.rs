//! Per-hall, per-day occupancy derived from confirmed bookings.
//!
//! Occupancy is never stored. It is recomputed from the bookings each time,
//! so classifying twice with no writes in between gives the same answer.

use crate::booking::Booking;
use crate::types::HallName;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Colour band of a calendar cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyLevel {
    /// No confirmed booking
    Available,
    /// Exactly one confirmed booking
    Single,
    /// Two or more confirmed bookings on the same hall and day
    Overbooked,
}

impl OccupancyLevel {
    /// Classifies a number of confirmed bookings
    #[must_use]
    pub const fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Available,
            1 => Self::Single,
            _ => Self::Overbooked,
        }
    }
}

impl fmt::Display for OccupancyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Available => "available",
            Self::Single => "single",
            Self::Overbooked => "overbooked",
        };
        f.write_str(name)
    }
}

/// One `(hall, date)` calendar cell
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyCell {
    /// Hall
    pub hall: HallName,
    /// Day
    pub date: NaiveDate,
    /// Confirmed bookings on that hall and day
    pub confirmed: usize,
    /// Derived level
    pub level: OccupancyLevel,
}

/// Groups confirmed bookings into calendar cells ordered by hall then date.
///
/// Bookings that are not confirmed are ignored. Cells with no confirmed
/// booking are not produced.
#[must_use]
pub fn build_calendar(bookings: &[Booking]) -> Vec<OccupancyCell> {
    let mut counts: BTreeMap<(&HallName, NaiveDate), usize> = BTreeMap::new();
    for booking in bookings.iter().filter(|b| b.status.holds_slot()) {
        *counts.entry((&booking.hall, booking.event_date)).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((hall, date), confirmed)| OccupancyCell {
            hall: hall.clone(),
            date,
            confirmed,
            level: OccupancyLevel::from_count(confirmed),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::booking::{BookingRequest, BookingStatus};
    use crate::types::{BookingId, BranchId, ContactInfo, Money};
    use chrono::{NaiveTime, TimeZone, Utc};

    fn booking(hall: &str, day: u32, hour: u32) -> Booking {
        BookingRequest {
            branch_id: BranchId::new(),
            hall: HallName::new(hall).unwrap(),
            event_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            event_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            guest_count: 100,
            total_amount: Money::from_rupees(10_000),
            advance_amount: Money::ZERO,
            client: ContactInfo::new("Client", "1"),
        }
        .into_booking(
            BookingId::new(),
            None,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_levels() {
        assert_eq!(OccupancyLevel::from_count(0), OccupancyLevel::Available);
        assert_eq!(OccupancyLevel::from_count(1), OccupancyLevel::Single);
        assert_eq!(OccupancyLevel::from_count(5), OccupancyLevel::Overbooked);
    }

    #[test]
    fn test_calendar_groups_by_hall_and_day() {
        let mut cancelled = booking("Lotus", 11, 18);
        cancelled.status = BookingStatus::Cancelled;
        let bookings = vec![
            booking("Grand Ballroom", 10, 18),
            booking("Grand Ballroom", 10, 12),
            booking("Grand Ballroom", 11, 18),
            cancelled,
        ];

        let cells = build_calendar(&bookings);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].level, OccupancyLevel::Overbooked);
        assert_eq!(cells[0].confirmed, 2);
        assert_eq!(cells[1].level, OccupancyLevel::Single);
    }
}
