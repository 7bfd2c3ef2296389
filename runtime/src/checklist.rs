//! Checklist engine.
//!
//! Milestones are stored as a timestamp (completed) or nothing (open).
//! Completing `advance_payment` for the first time is routed through the
//! conversion path: the milestone, the lead's `advance_paid` status and the
//! new booking are committed together, or not at all.

use banquet_core::booking::Booking;
use banquet_core::checklist::{Checklist, Milestone, MilestoneUpdate};
use banquet_core::error::BookingError;
use banquet_core::lead::Lead;
use banquet_core::notification::ChangeEvent;
use banquet_core::repository::ConversionPlan;
use banquet_core::types::{BookingId, ChecklistId, LeadId};
use smallvec::smallvec;

use crate::environment::BanquetEnvironment;
use crate::lifecycle::commit_conversion;

/// What a milestone update produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MilestoneOutcome {
    /// The checklist as stored after the update
    pub checklist: Checklist,
    /// Whether anything was written
    pub changed: bool,
    /// The booking created when this update passed the advance-payment gate
    pub booking: Option<Booking>,
}

/// Applies milestone updates to lead checklists
#[derive(Clone, Debug)]
pub struct ChecklistEngine {
    env: BanquetEnvironment,
}

impl ChecklistEngine {
    /// Creates the engine
    #[must_use]
    pub const fn new(env: BanquetEnvironment) -> Self {
        Self { env }
    }

    /// Completes or reopens a milestone.
    ///
    /// - Completing an open `advance_payment` needs a positive amount and
    ///   conversion terms. It converts the lead and creates the booking.
    /// - Completing an already completed `advance_payment` changes nothing.
    /// - `advance_payment` cannot be reopened.
    /// - Completing `full_payment` needs a positive amount, which is only recorded
    ///   here; apply it to the booking with `record_payment`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown checklist
    /// - [`BookingError::InvalidAmount`] for a missing or zero payment amount
    /// - [`BookingError::MissingConversionTerms`] when the advance payment lacks booking terms
    /// - [`BookingError::InvalidTransition`] when reopening the advance payment or
    ///   converting a lead that is `lost`
    /// - [`BookingError::DoubleBooking`] when the conversion's slot is taken
    #[tracing::instrument(skip(self, update), fields(milestone = %update.milestone))]
    pub async fn complete_milestone(
        &self,
        checklist_id: ChecklistId,
        update: MilestoneUpdate,
    ) -> Result<MilestoneOutcome, BookingError> {
        let current = self.env.repository.checklist(checklist_id).await?;

        if update.completes_advance_payment() {
            if current.is_complete(Milestone::AdvancePayment) {
                tracing::debug!("Advance payment already complete");
                return Ok(MilestoneOutcome {
                    checklist: current,
                    changed: false,
                    booking: None,
                });
            }
            return self.pass_advance_gate(current.lead_id, update).await;
        }

        let at = self.env.clock.now();
        let MilestoneUpdate {
            milestone,
            completed_at,
            amount,
            ..
        } = update;

        let _gate = self.env.gates.enter(current.branch_id).await;
        let (checklist, changed) = self
            .env
            .repository
            .update_checklist(
                checklist_id,
                Box::new(move |checklist: &mut Checklist| {
                    checklist.set_milestone(milestone, completed_at, amount, at)
                }),
            )
            .await?;

        if changed {
            self.env.publish(
                checklist.branch_id,
                smallvec![ChangeEvent::ChecklistUpdated {
                    checklist: checklist.clone(),
                }],
            );
            tracing::info!(
                completed = completed_at.is_some(),
                progress = checklist.progress_percent(),
                "Checklist updated"
            );
        }

        Ok(MilestoneOutcome {
            checklist,
            changed,
            booking: None,
        })
    }

    async fn pass_advance_gate(
        &self,
        lead_id: LeadId,
        update: MilestoneUpdate,
    ) -> Result<MilestoneOutcome, BookingError> {
        let amount = update
            .amount
            .ok_or_else(|| BookingError::InvalidAmount("Advance payment requires an amount".to_string()))?
            .require_positive("Advance payment")?;
        let terms = update.terms.ok_or(BookingError::MissingConversionTerms)?;
        let completed_at = update.completed_at.unwrap_or_else(|| self.env.clock.now());
        let at = self.env.clock.now();
        let booking_id = BookingId::new();

        let plan: ConversionPlan = Box::new(move |lead: &mut Lead, checklist: &mut Checklist| {
            if !checklist.mark_advance_payment(amount, completed_at)? {
                return Ok(None);
            }
            lead.convert(at)?;
            let request = terms.into_request(lead, amount)?;
            request.into_booking(booking_id, Some(lead.id), at).map(Some)
        });

        let outcome = commit_conversion(&self.env, lead_id, plan).await?;
        Ok(MilestoneOutcome {
            changed: outcome.booking.is_some(),
            checklist: outcome.checklist,
            booking: outcome.booking,
        })
    }

    /// Loads a checklist.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown checklist.
    pub async fn get_checklist(&self, checklist_id: ChecklistId) -> Result<Checklist, BookingError> {
        self.env.repository.checklist(checklist_id).await
    }

    /// Loads the checklist of a lead.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown lead.
    pub async fn checklist_for_lead(&self, lead_id: LeadId) -> Result<Checklist, BookingError> {
        self.env.repository.checklist_for_lead(lead_id).await
    }
}
