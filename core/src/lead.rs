//! Sales leads and their lifecycle.
//!
//! ```text
//! new → contacted → site_visit → tasting → negotiation ──(advance payment)──> advance_paid
//!  │        │            │           │           │
//!  └────────┴────────────┴───────────┴───────────┴──────────────────────────> lost
//! ```
//!
//! Plain status updates may move a lead forward one or more stages or mark it
//! lost. `advance_paid` is only reachable through the advance-payment gate.
//! Both `advance_paid` and `lost` are terminal.

use crate::error::{BookingError, Entity};
use crate::types::{BranchId, ContactInfo, LeadId, Money, SalespersonId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lead lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Just captured
    New,
    /// First call made
    Contacted,
    /// Client visited the property
    SiteVisit,
    /// Food tasting held
    Tasting,
    /// Negotiating price and terms
    Negotiation,
    /// Advance received, booking created
    AdvancePaid,
    /// Client walked away
    Lost,
}

impl LeadStatus {
    /// All statuses in funnel order
    pub const ALL: [Self; 7] = [
        Self::New,
        Self::Contacted,
        Self::SiteVisit,
        Self::Tasting,
        Self::Negotiation,
        Self::AdvancePaid,
        Self::Lost,
    ];

    /// Stable lowercase name used in storage and notifications
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::SiteVisit => "site_visit",
            Self::Tasting => "tasting",
            Self::Negotiation => "negotiation",
            Self::AdvancePaid => "advance_paid",
            Self::Lost => "lost",
        }
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::AdvancePaid | Self::Lost)
    }

    const fn stage(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Contacted => 1,
            Self::SiteVisit => 2,
            Self::Tasting => 3,
            Self::Negotiation => 4,
            Self::AdvancePaid => 5,
            Self::Lost => u8::MAX,
        }
    }

    /// Whether a plain status update from `self` to `next` is allowed.
    ///
    /// `advance_paid` is never allowed here; see [`LeadStatus::can_convert`].
    #[must_use]
    pub const fn can_update_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Lost => true,
            Self::AdvancePaid => false,
            _ => next.stage() > self.stage(),
        }
    }

    /// Whether the advance-payment gate may convert a lead in this status
    #[must_use]
    pub const fn can_convert(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| BookingError::Validation(format!("Unknown lead status '{s}'")))
    }
}

/// A prospective client working through the sales funnel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    /// Lead identifier
    pub id: LeadId,
    /// Branch the lead belongs to
    pub branch_id: BranchId,
    /// Salesperson responsible for the lead
    pub salesperson_id: SalespersonId,
    /// Client contact details
    pub contact: ContactInfo,
    /// Date the client wants to hold the event
    pub event_date: NaiveDate,
    /// Expected number of guests
    pub guest_count: u32,
    /// Client's stated budget, if any
    pub estimated_budget: Option<Money>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Current lifecycle status
    pub status: LeadStatus,
    /// When the lead was captured
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Applies a plain status update.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidTransition`] if the transition table forbids it.
    pub fn transition_to(&mut self, next: LeadStatus, at: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.status.can_update_to(next) {
            return Err(BookingError::invalid_transition(Entity::Lead, self.status, next));
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Moves the lead to `advance_paid`. Only the advance-payment gate calls this.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidTransition`] if the lead is already terminal.
    pub fn convert(&mut self, at: DateTime<Utc>) -> Result<(), BookingError> {
        if !self.status.can_convert() {
            return Err(BookingError::invalid_transition(
                Entity::Lead,
                self.status,
                LeadStatus::AdvancePaid,
            ));
        }
        self.status = LeadStatus::AdvancePaid;
        self.updated_at = at;
        Ok(())
    }
}

/// Input for capturing a new lead
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    /// Branch the lead belongs to
    pub branch_id: BranchId,
    /// Salesperson capturing the lead
    pub salesperson_id: SalespersonId,
    /// Client contact details
    pub contact: ContactInfo,
    /// Target event date
    pub event_date: NaiveDate,
    /// Expected guests
    pub guest_count: u32,
    /// Client's stated budget
    pub estimated_budget: Option<Money>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl NewLead {
    /// Checks the input before a lead is created.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] for a blank client name or zero guests.
    pub fn validate(&self) -> Result<(), BookingError> {
        self.contact.validate()?;
        if self.guest_count == 0 {
            return Err(BookingError::Validation(
                "Guest count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the lead record in status `new`
    #[must_use]
    pub fn into_lead(self, id: LeadId, at: DateTime<Utc>) -> Lead {
        Lead {
            id,
            branch_id: self.branch_id,
            salesperson_id: self.salesperson_id,
            contact: self.contact,
            event_date: self.event_date,
            guest_count: self.guest_count,
            estimated_budget: self.estimated_budget,
            notes: self.notes,
            status: LeadStatus::New,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Lead counts for a branch's sales funnel, aggregated at query time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunnelStats {
    /// Branch the stats cover
    pub branch_id: BranchId,
    /// Leads per status, in funnel order, including zero counts
    pub by_status: Vec<(LeadStatus, u64)>,
    /// All leads of the branch
    pub total: u64,
    /// `advance_paid / total` as a percentage; `0.0` without leads
    pub conversion_rate: f64,
}

impl FunnelStats {
    /// Builds the stats from raw per-status counts. Missing statuses count as zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Lead counts stay far below 2^52
    pub fn from_counts(branch_id: BranchId, counts: &[(LeadStatus, u64)]) -> Self {
        let by_status: Vec<(LeadStatus, u64)> = LeadStatus::ALL
            .into_iter()
            .map(|status| {
                let count = counts
                    .iter()
                    .filter(|(s, _)| *s == status)
                    .map(|(_, n)| n)
                    .sum();
                (status, count)
            })
            .collect();
        let total: u64 = by_status.iter().map(|(_, n)| n).sum();
        let converted = by_status
            .iter()
            .find(|(s, _)| *s == LeadStatus::AdvancePaid)
            .map_or(0, |(_, n)| *n);
        let conversion_rate = if total == 0 {
            0.0
        } else {
            converted as f64 * 100.0 / total as f64
        };

        Self {
            branch_id,
            by_status,
            total,
            conversion_rate,
        }
    }

    /// Leads currently in `status`
    #[must_use]
    pub fn count(&self, status: LeadStatus) -> u64 {
        self.by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn status() -> impl Strategy<Value = LeadStatus> {
        proptest::sample::select(LeadStatus::ALL.to_vec())
    }

    proptest! {
        /// An accepted plain update leaves an open status, moves forward and never converts
        #[test]
        fn prop_accepted_updates_move_forward(from in status(), to in status()) {
            if from.can_update_to(to) {
                prop_assert!(!from.is_terminal());
                prop_assert_ne!(to, LeadStatus::AdvancePaid);
                prop_assert!(to == LeadStatus::Lost || to.stage() > from.stage());
            }
        }

        /// Following only accepted updates never revisits a status
        #[test]
        fn prop_update_paths_never_revisit(steps in proptest::collection::vec(status(), 1..12)) {
            let mut current = LeadStatus::New;
            let mut seen = vec![current];
            for next in steps {
                if current.can_update_to(next) {
                    prop_assert!(!seen.contains(&next));
                    seen.push(next);
                    current = next;
                }
            }
        }
    }
}
