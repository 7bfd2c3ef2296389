//! Error taxonomy returned by every booking-core operation.

use crate::booking::Conflict;
use crate::types::ConflictKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of record an error refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    /// A sales lead
    Lead,
    /// A lead's milestone checklist
    Checklist,
    /// A hall booking
    Booking,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lead => "Lead",
            Self::Checklist => "Checklist",
            Self::Booking => "Booking",
        };
        f.write_str(name)
    }
}

/// Errors returned by lead, checklist and booking operations.
///
/// None of these are retried by the core. Callers decide how to react, e.g.
/// by offering another time slot after a [`BookingError::DoubleBooking`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// No record with the given id
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record looked up
        entity: Entity,
        /// Identifier that was not found
        id: String,
    },

    /// Payment amount is missing, zero, non-numeric or inconsistent with the booking
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The slot is already held by a confirmed booking
    #[error("Double booking: {0}")]
    DoubleBooking(Conflict),

    /// Status change not allowed by the state machine
    #[error("Invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        /// Kind of record
        entity: Entity,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Storage-level uniqueness guard rejected a confirmed booking for an occupied slot
    #[error("Slot {0} is already taken")]
    ConstraintViolation(ConflictKey),

    /// Advance payment was completed without the hall, time and total needed for the booking
    #[error("Completing the advance payment requires hall, event time and total amount")]
    MissingConversionTerms,

    /// Malformed input (blank names, zero guests, ...)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Creates a [`BookingError::NotFound`] for `entity` with the given id
    #[must_use]
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a [`BookingError::InvalidTransition`]
    #[must_use]
    pub fn invalid_transition(
        entity: Entity,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether the error means "slot taken", regardless of which layer caught it
    #[must_use]
    pub const fn is_double_booking(&self) -> bool {
        matches!(self, Self::DoubleBooking(_) | Self::ConstraintViolation(_))
    }

    /// The colliding booking, when known
    #[must_use]
    pub const fn conflict(&self) -> Option<&Conflict> {
        match self {
            Self::DoubleBooking(conflict) => Some(conflict),
            _ => None,
        }
    }
}
