//! Identifiers and value objects shared by leads, checklists and bookings.

use crate::error::BookingError;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a branch (one banquet property with its own halls)
    BranchId
);
uuid_id!(
    /// Unique identifier for a salesperson
    SalespersonId
);
uuid_id!(
    /// Unique identifier for a sales lead
    LeadId
);
uuid_id!(
    /// Unique identifier for a lead's checklist
    ChecklistId
);
uuid_id!(
    /// Unique identifier for a hall booking
    BookingId
);

// ============================================================================
// Money Value Object (paise-based to avoid floating point errors)
// ============================================================================

/// An amount in Indian rupees, stored as paise.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero rupees
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from paise
    #[must_use]
    pub const fn from_paise(paise: u64) -> Self {
        Self(paise)
    }

    /// Creates a `Money` value from whole rupees
    ///
    /// # Panics
    ///
    /// Panics if `rupees * 100` overflows. Use `checked_from_rupees` for
    /// non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_rupees(rupees: u64) -> Self {
        match rupees.checked_mul(100) {
            Some(paise) => Self(paise),
            None => panic!("Money::from_rupees overflow"),
        }
    }

    /// Creates a `Money` value from whole rupees with overflow checking
    #[must_use]
    pub const fn checked_from_rupees(rupees: u64) -> Option<Self> {
        match rupees.checked_mul(100) {
            Some(paise) => Some(Self(paise)),
            None => None,
        }
    }

    /// Returns the amount in paise
    #[must_use]
    pub const fn paise(&self) -> u64 {
        self.0
    }

    /// Returns the whole rupee part of the amount
    #[must_use]
    pub const fn rupees(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts `other`, returning `None` if the result would be negative
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Adds `percent` percent on top of the amount, rounding down to the paisa
    #[must_use]
    pub const fn checked_apply_markup(self, percent: u32) -> Option<Self> {
        let markup = match self.0.checked_mul(percent as u64) {
            Some(product) => product / 100,
            None => return None,
        };

        match self.0.checked_add(markup) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Returns the amount if it is strictly positive.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidAmount`] naming `field` when the amount is zero.
    pub fn require_positive(self, field: &str) -> Result<Self, BookingError> {
        if self.is_zero() {
            return Err(BookingError::InvalidAmount(format!(
                "{field} must be greater than zero"
            )));
        }
        Ok(self)
    }

    /// Parses a user-entered rupee amount such as `"50000"`, `"50000.5"` or
    /// `"1,25,000.00"`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidAmount`] for empty, negative or
    /// non-numeric input, empty comma groups, more than two decimal places,
    /// or overflow.
    pub fn parse(input: &str) -> Result<Self, BookingError> {
        let invalid = || BookingError::InvalidAmount(format!("'{input}' is not a valid amount"));

        let trimmed = input.trim();
        let (grouped, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        // Digit groups may be comma separated, but never empty
        if grouped.split(',').any(str::is_empty) {
            return Err(invalid());
        }
        let whole: String = grouped.chars().filter(|c| *c != ',').collect();

        if whole.is_empty()
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > 2
        {
            return Err(invalid());
        }

        let rupees: u64 = whole.parse().map_err(|_| invalid())?;
        let paise: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        Self::checked_from_rupees(rupees)
            .and_then(|amount| amount.checked_add(Self(paise)))
            .ok_or_else(invalid)
    }
}

impl FromStr for Money {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}.{:02}", self.rupees(), self.0 % 100)
    }
}

// ============================================================================
// Halls, contacts and slots
// ============================================================================

/// Name of a hall within a branch (e.g. "Grand Ballroom").
///
/// Surrounding whitespace is trimmed; otherwise names compare exactly.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HallName(String);

impl HallName {
    /// Creates a hall name.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if the name is blank.
    pub fn new(name: impl AsRef<str>) -> Result<Self, BookingError> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(BookingError::Validation(
                "Hall name cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the hall name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HallName {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HallName> for String {
    fn from(value: HallName) -> Self {
        value.0
    }
}

impl fmt::Display for HallName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contact details for a prospective or confirmed client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Client name
    pub name: String,
    /// Phone number as entered
    pub phone: String,
    /// Optional email address
    pub email: Option<String>,
}

impl ContactInfo {
    /// Creates contact info without an email address
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
        }
    }

    /// Sets the email address
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Validates that a client name is present.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] if the name is blank.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.name.trim().is_empty() {
            return Err(BookingError::Validation(
                "Client name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The slot a confirmed booking occupies: hall, date and start time within a branch.
///
/// Two confirmed bookings may never share a key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConflictKey {
    /// Branch owning the hall
    pub branch_id: BranchId,
    /// Hall name
    pub hall: HallName,
    /// Event date
    pub date: NaiveDate,
    /// Event start time
    pub time: NaiveTime,
}

impl ConflictKey {
    /// Creates a new `ConflictKey`
    #[must_use]
    pub const fn new(branch_id: BranchId, hall: HallName, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            branch_id,
            hall,
            date,
            time,
        }
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} at {}",
            self.hall,
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M")
        )
    }
}

/// Parses an event start time written as `HH:MM` (24-hour clock).
///
/// # Errors
///
/// Returns [`BookingError::Validation`] if the input is not a valid time.
pub fn parse_event_time(input: &str) -> Result<NaiveTime, BookingError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|e| BookingError::Validation(format!("Invalid event time '{input}': {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_money_parse() {
        assert_eq!(Money::parse("50000").unwrap(), Money::from_rupees(50_000));
        assert_eq!(Money::parse("1,25,000.50").unwrap().paise(), 12_500_050);
        assert_eq!(Money::parse("99.5").unwrap().paise(), 9_950);
        assert_eq!(Money::parse(" 0 ").unwrap(), Money::ZERO);
    }

    #[test]
    fn test_money_parse_rejects_garbage() {
        for input in [
            "", "abc", "-100", "12.345", ".5", "1e5", "12.3.4", "1,,2", ",5", "5,", "1,000.,5",
        ] {
            assert!(
                matches!(Money::parse(input), Err(BookingError::InvalidAmount(_))),
                "expected '{input}' to be rejected"
            );
        }
    }

    #[test]
    fn test_money_markup_rounds_down() {
        let total = Money::from_rupees(500_000);
        assert_eq!(
            total.checked_apply_markup(18),
            Some(Money::from_rupees(590_000))
        );
        assert_eq!(
            Money::from_paise(101).checked_apply_markup(18),
            Some(Money::from_paise(119))
        );
    }

    #[test]
    fn test_money_require_positive() {
        assert!(Money::from_rupees(1).require_positive("advance").is_ok());
        assert!(matches!(
            Money::ZERO.require_positive("advance"),
            Err(BookingError::InvalidAmount(msg)) if msg.contains("advance")
        ));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_paise(40_000_050).to_string(), "₹400000.50");
    }

    #[test]
    fn test_hall_name_trims_and_rejects_blank() {
        assert_eq!(HallName::new("  Grand Ballroom ").unwrap().as_str(), "Grand Ballroom");
        assert!(HallName::new("   ").is_err());
    }

    #[test]
    fn test_parse_event_time() {
        assert_eq!(
            parse_event_time("18:00").unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap()
        );
        assert!(parse_event_time("25:00").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The markup adds exactly `amount * percent / 100`, rounded down
        #[test]
        fn prop_markup_adds_rounded_down_share(
            paise in 0u64..=u64::MAX / 200,
            percent in 0u32..=100,
        ) {
            let marked = Money::from_paise(paise).checked_apply_markup(percent);
            prop_assert_eq!(
                marked,
                Some(Money::from_paise(paise + paise * u64::from(percent) / 100))
            );
        }

        /// Overflow yields `None` instead of wrapping
        #[test]
        fn prop_markup_never_wraps(paise in any::<u64>(), percent in any::<u32>()) {
            if let Some(marked) = Money::from_paise(paise).checked_apply_markup(percent) {
                prop_assert!(marked.paise() >= paise);
            }
        }
    }
}
