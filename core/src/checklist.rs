//! The nine-milestone checklist each lead carries.
//!
//! Milestones can be completed in any order and, with one exception, toggled
//! back. `advance_payment` is the gate: completing it converts the lead and
//! creates the booking, and it can never be un-completed.

use crate::booking::{BookingRequest, total_including_gst};
use crate::error::{BookingError, Entity};
use crate::lead::Lead;
use crate::types::{BranchId, ChecklistId, HallName, LeadId, Money};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A checklist milestone, in display order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Initial call
    Call,
    /// Client visited the property
    PropertyVisit,
    /// Food tasting held
    FoodTasting,
    /// Advance received; converts the lead
    AdvancePayment,
    /// Menu agreed
    MenuFinalized,
    /// Decoration agreed
    DecorationFinalized,
    /// Remaining amount received
    FullPayment,
    /// Accounts settled after the event
    PostEventSettlement,
    /// Client feedback collected
    Feedback,
}

impl Milestone {
    /// Number of milestones
    pub const COUNT: usize = 9;

    /// All milestones in display order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Call,
        Self::PropertyVisit,
        Self::FoodTasting,
        Self::AdvancePayment,
        Self::MenuFinalized,
        Self::DecorationFinalized,
        Self::FullPayment,
        Self::PostEventSettlement,
        Self::Feedback,
    ];

    /// Stable lowercase key
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::PropertyVisit => "property_visit",
            Self::FoodTasting => "food_tasting",
            Self::AdvancePayment => "advance_payment",
            Self::MenuFinalized => "menu_finalized",
            Self::DecorationFinalized => "decoration_finalized",
            Self::FullPayment => "full_payment",
            Self::PostEventSettlement => "post_event_settlement",
            Self::Feedback => "feedback",
        }
    }

    /// Whether the milestone records an amount
    #[must_use]
    pub const fn is_payment(self) -> bool {
        matches!(self, Self::AdvancePayment | Self::FullPayment)
    }

    /// Position in [`Milestone::ALL`]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Milestone {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| BookingError::Validation(format!("Unknown milestone '{s}'")))
    }
}

/// Completion state of one milestone
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneState {
    /// When the milestone was completed; `None` if open
    pub completed_at: Option<DateTime<Utc>>,
    /// Amount recorded by payment milestones
    pub amount: Option<Money>,
}

impl MilestoneState {
    /// Whether the milestone is done
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A lead's milestone checklist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    /// Checklist identifier
    pub id: ChecklistId,
    /// Owning lead
    pub lead_id: LeadId,
    /// Branch of the owning lead
    pub branch_id: BranchId,
    /// Milestone states indexed by [`Milestone::index`]
    pub milestones: [MilestoneState; Milestone::COUNT],
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Checklist {
    /// Creates an all-open checklist for `lead`
    #[must_use]
    pub fn new(id: ChecklistId, lead: &Lead) -> Self {
        Self {
            id,
            lead_id: lead.id,
            branch_id: lead.branch_id,
            milestones: [MilestoneState::default(); Milestone::COUNT],
            updated_at: lead.created_at,
        }
    }

    /// State of one milestone
    #[must_use]
    pub const fn state(&self, milestone: Milestone) -> &MilestoneState {
        &self.milestones[milestone.index()]
    }

    /// Whether `milestone` is done
    #[must_use]
    pub const fn is_complete(&self, milestone: Milestone) -> bool {
        self.state(milestone).is_complete()
    }

    /// Number of completed milestones
    #[must_use]
    pub fn completed_count(&self) -> u32 {
        self.milestones
            .iter()
            .filter(|state| state.is_complete())
            .fold(0, |count, _| count + 1)
    }

    /// Completed milestones as a percentage of all nine
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        f64::from(self.completed_count()) * 100.0 / 9.0
    }

    /// Completes or reopens any milestone other than a first-time advance payment.
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTransition`] when reopening a completed advance payment
    /// - [`BookingError::MissingConversionTerms`] when completing an open advance
    ///   payment (that goes through the conversion path)
    /// - [`BookingError::InvalidAmount`] when completing `full_payment` without a positive amount
    /// - [`BookingError::Validation`] when an amount is given for a non-payment milestone
    pub fn set_milestone(
        &mut self,
        milestone: Milestone,
        completed_at: Option<DateTime<Utc>>,
        amount: Option<Money>,
        at: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        if amount.is_some() && !milestone.is_payment() {
            return Err(BookingError::Validation(format!(
                "Milestone {milestone} does not take an amount"
            )));
        }

        let current = *self.state(milestone);

        if milestone == Milestone::AdvancePayment {
            return match (completed_at, current.is_complete()) {
                (None, true) => Err(BookingError::invalid_transition(
                    Entity::Checklist,
                    "advance_payment completed",
                    "advance_payment open",
                )),
                (Some(_), false) => Err(BookingError::MissingConversionTerms),
                _ => Ok(false),
            };
        }

        let next = match completed_at {
            None => MilestoneState::default(),
            Some(completed_at) => {
                let amount = if milestone == Milestone::FullPayment {
                    let amount = amount.ok_or_else(|| {
                        BookingError::InvalidAmount("Full payment requires an amount".to_string())
                    })?;
                    Some(amount.require_positive("Full payment")?)
                } else {
                    None
                };
                MilestoneState {
                    completed_at: Some(completed_at),
                    amount,
                }
            }
        };

        if next == current {
            return Ok(false);
        }
        self.milestones[milestone.index()] = next;
        self.updated_at = at;
        Ok(true)
    }

    /// Completes the advance-payment gate. Returns `false` if it was already complete.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidAmount`] if `amount` is zero.
    pub fn mark_advance_payment(
        &mut self,
        amount: Money,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        let amount = amount.require_positive("Advance payment")?;
        if self.is_complete(Milestone::AdvancePayment) {
            return Ok(false);
        }
        self.milestones[Milestone::AdvancePayment.index()] = MilestoneState {
            completed_at: Some(completed_at),
            amount: Some(amount),
        };
        self.updated_at = completed_at;
        Ok(true)
    }
}

/// What the booking created by an advance payment looks like
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionTerms {
    /// Hall to reserve
    pub hall: HallName,
    /// Event start time
    pub event_time: NaiveTime,
    /// Quoted total before GST
    pub total_amount: Money,
}

impl ConversionTerms {
    /// Creates conversion terms
    #[must_use]
    pub const fn new(hall: HallName, event_time: NaiveTime, total_amount: Money) -> Self {
        Self {
            hall,
            event_time,
            total_amount,
        }
    }

    /// Builds the booking request for `lead`, adding GST to the total.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidAmount`] if the advance is zero, the total is zero,
    ///   or the advance exceeds the GST-inclusive total
    /// - [`BookingError::Validation`] if the lead's details cannot make a booking
    pub fn into_request(self, lead: &Lead, advance: Money) -> Result<BookingRequest, BookingError> {
        let advance = advance.require_positive("Advance")?;
        let total = total_including_gst(self.total_amount.require_positive("Total")?)?;
        if advance > total {
            return Err(BookingError::InvalidAmount(format!(
                "Advance {advance} exceeds total {total} including GST"
            )));
        }

        let request = BookingRequest {
            branch_id: lead.branch_id,
            hall: self.hall,
            event_date: lead.event_date,
            event_time: self.event_time,
            guest_count: lead.guest_count,
            total_amount: total,
            advance_amount: advance,
            client: lead.contact.clone(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// One milestone change requested by a caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneUpdate {
    /// Milestone to change
    pub milestone: Milestone,
    /// Completion time; `None` reopens the milestone
    pub completed_at: Option<DateTime<Utc>>,
    /// Amount for payment milestones
    pub amount: Option<Money>,
    /// Booking terms, required when completing `advance_payment`
    pub terms: Option<ConversionTerms>,
}

impl MilestoneUpdate {
    /// Completes `milestone` at `at`
    #[must_use]
    pub const fn complete(milestone: Milestone, at: DateTime<Utc>) -> Self {
        Self {
            milestone,
            completed_at: Some(at),
            amount: None,
            terms: None,
        }
    }

    /// Reopens `milestone`
    #[must_use]
    pub const fn reopen(milestone: Milestone) -> Self {
        Self {
            milestone,
            completed_at: None,
            amount: None,
            terms: None,
        }
    }

    /// Attaches an amount
    #[must_use]
    pub const fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Attaches conversion terms
    #[must_use]
    pub fn with_terms(mut self, terms: ConversionTerms) -> Self {
        self.terms = Some(terms);
        self
    }

    /// Whether this update asks to pass the advance-payment gate
    #[must_use]
    pub const fn completes_advance_payment(&self) -> bool {
        matches!(self.milestone, Milestone::AdvancePayment) && self.completed_at.is_some()
    }
}
