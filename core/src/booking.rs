//! Hall bookings: amounts, status machine and the conflict key they occupy.

use crate::error::{BookingError, Entity};
use crate::types::{BookingId, BranchId, ConflictKey, ContactInfo, HallName, LeadId, Money};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Goods and services tax added to the quoted total when a lead converts
pub const GST_PERCENT: u32 = 18;

/// Adds [`GST_PERCENT`] to a pre-tax total, rounding down to the paisa.
///
/// # Errors
///
/// Returns [`BookingError::InvalidAmount`] if the result overflows.
pub fn total_including_gst(total: Money) -> Result<Money, BookingError> {
    total
        .checked_apply_markup(GST_PERCENT)
        .ok_or_else(|| BookingError::InvalidAmount(format!("Total {total} is too large")))
}

/// Booking lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Hall reserved; holds the conflict key
    Confirmed,
    /// Event took place
    Completed,
    /// Reservation withdrawn
    Cancelled,
}

impl BookingStatus {
    /// All statuses
    pub const ALL: [Self; 3] = [Self::Confirmed, Self::Completed, Self::Cancelled];

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only `confirmed → completed` and `confirmed → cancelled` are legal
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Confirmed, Self::Completed | Self::Cancelled)
        )
    }

    /// Whether a booking in this status occupies its slot
    #[must_use]
    pub const fn holds_slot(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| BookingError::Validation(format!("Unknown booking status '{s}'")))
    }
}

/// A hall reservation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier
    pub id: BookingId,
    /// Branch owning the hall
    pub branch_id: BranchId,
    /// Lead this booking was converted from; `None` for direct bookings
    pub lead_id: Option<LeadId>,
    /// Client details
    pub client: ContactInfo,
    /// Reserved hall
    pub hall: HallName,
    /// Event date
    pub event_date: NaiveDate,
    /// Event start time
    pub event_time: NaiveTime,
    /// Expected guests
    pub guest_count: u32,
    /// Total amount payable
    pub total_amount: Money,
    /// Amount received so far
    pub advance_amount: Money,
    /// Always `total_amount - advance_amount`
    pub balance_amount: Money,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The slot this booking occupies while confirmed
    #[must_use]
    pub fn conflict_key(&self) -> ConflictKey {
        ConflictKey::new(
            self.branch_id,
            self.hall.clone(),
            self.event_date,
            self.event_time,
        )
    }

    /// Moves the booking to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidTransition`] unless the move leaves `confirmed`.
    pub fn transition_to(&mut self, next: BookingStatus, at: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.status.can_transition_to(next) {
            return Err(BookingError::invalid_transition(Entity::Booking, self.status, next));
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Adds a received payment to the advance and recomputes the balance.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTransition`] if the booking is not confirmed
    /// - [`BookingError::InvalidAmount`] if the amount is zero or exceeds the balance
    pub fn record_payment(&mut self, amount: Money, at: DateTime<Utc>) -> Result<(), BookingError> {
        self.require_confirmed("record payment")?;
        let amount = amount.require_positive("Payment")?;
        if amount > self.balance_amount {
            return Err(BookingError::InvalidAmount(format!(
                "Payment {amount} exceeds outstanding balance {}",
                self.balance_amount
            )));
        }
        self.advance_amount = self
            .advance_amount
            .checked_add(amount)
            .ok_or_else(|| BookingError::InvalidAmount("Payment overflow".to_string()))?;
        self.recalculate_balance()?;
        self.updated_at = at;
        Ok(())
    }

    /// Replaces the total, keeping everything already received.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTransition`] if the booking is not confirmed
    /// - [`BookingError::InvalidAmount`] if the new total is zero or below the amount received
    pub fn revise_total(&mut self, new_total: Money, at: DateTime<Utc>) -> Result<(), BookingError> {
        self.require_confirmed("revise total")?;
        let new_total = new_total.require_positive("Total")?;
        if new_total < self.advance_amount {
            return Err(BookingError::InvalidAmount(format!(
                "Total {new_total} is below the {} already received",
                self.advance_amount
            )));
        }
        self.total_amount = new_total;
        self.recalculate_balance()?;
        self.updated_at = at;
        Ok(())
    }

    fn require_confirmed(&self, action: &str) -> Result<(), BookingError> {
        if self.status.holds_slot() {
            Ok(())
        } else {
            Err(BookingError::InvalidTransition {
                entity: Entity::Booking,
                from: self.status.to_string(),
                to: action.to_string(),
            })
        }
    }

    fn recalculate_balance(&mut self) -> Result<(), BookingError> {
        self.balance_amount = self
            .total_amount
            .checked_sub(self.advance_amount)
            .ok_or_else(|| {
                BookingError::InvalidAmount(format!(
                    "Advance {} exceeds total {}",
                    self.advance_amount, self.total_amount
                ))
            })?;
        Ok(())
    }
}

/// Input for a direct booking (or the booking half of a conversion)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Branch owning the hall
    pub branch_id: BranchId,
    /// Requested hall
    pub hall: HallName,
    /// Event date
    pub event_date: NaiveDate,
    /// Event start time
    pub event_time: NaiveTime,
    /// Expected guests
    pub guest_count: u32,
    /// Total amount payable
    pub total_amount: Money,
    /// Amount received up front
    pub advance_amount: Money,
    /// Client details
    pub client: ContactInfo,
}

impl BookingRequest {
    /// The slot the request wants
    #[must_use]
    pub fn conflict_key(&self) -> ConflictKey {
        ConflictKey::new(
            self.branch_id,
            self.hall.clone(),
            self.event_date,
            self.event_time,
        )
    }

    /// Checks amounts, guests and client details.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidAmount`] if the total is zero or the advance exceeds it
    /// - [`BookingError::Validation`] for zero guests or a blank client name
    pub fn validate(&self) -> Result<(), BookingError> {
        self.total_amount.require_positive("Total")?;
        if self.advance_amount > self.total_amount {
            return Err(BookingError::InvalidAmount(format!(
                "Advance {} exceeds total {}",
                self.advance_amount, self.total_amount
            )));
        }
        if self.guest_count == 0 {
            return Err(BookingError::Validation(
                "Guest count must be greater than zero".to_string(),
            ));
        }
        self.client.validate()
    }

    /// Builds a confirmed booking from a validated request.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidAmount`] if the advance exceeds the total.
    pub fn into_booking(
        self,
        id: BookingId,
        lead_id: Option<LeadId>,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let mut booking = Booking {
            id,
            branch_id: self.branch_id,
            lead_id,
            client: self.client,
            hall: self.hall,
            event_date: self.event_date,
            event_time: self.event_time,
            guest_count: self.guest_count,
            total_amount: self.total_amount,
            advance_amount: self.advance_amount,
            balance_amount: Money::ZERO,
            status: BookingStatus::Confirmed,
            created_at: at,
            updated_at: at,
        };
        booking.recalculate_balance()?;
        Ok(booking)
    }
}

/// An existing confirmed booking that already holds a requested slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The booking holding the slot
    pub booking_id: BookingId,
    /// The contested slot
    pub key: ConflictKey,
    /// Client of the existing booking
    pub client_name: String,
}

impl Conflict {
    /// Describes the collision with `booking`
    #[must_use]
    pub fn with(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            key: booking.conflict_key(),
            client_name: booking.client.name.clone(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is already booked by {} (booking {})",
            self.key, self.client_name, self.booking_id
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn status() -> impl Strategy<Value = BookingStatus> {
        proptest::sample::select(BookingStatus::ALL.to_vec())
    }

    proptest! {
        /// Only a confirmed booking moves, and it always moves off its slot
        #[test]
        fn prop_transitions_leave_confirmed(from in status(), to in status()) {
            if from.can_transition_to(to) {
                prop_assert_eq!(from, BookingStatus::Confirmed);
                prop_assert!(!to.holds_slot());
            }
        }

        /// A status path accepts at most one transition
        #[test]
        fn prop_at_most_one_transition(steps in proptest::collection::vec(status(), 1..8)) {
            let mut current = BookingStatus::Confirmed;
            let mut accepted = 0;
            for next in steps {
                if current.can_transition_to(next) {
                    accepted += 1;
                    current = next;
                }
            }
            prop_assert!(accepted <= 1);
        }
    }
}
