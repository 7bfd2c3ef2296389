//! Lead capture, status updates and funnel statistics.

use banquet_core::checklist::Checklist;
use banquet_core::error::BookingError;
use banquet_core::lead::{FunnelStats, Lead, LeadStatus, NewLead};
use banquet_core::notification::ChangeEvent;
use banquet_core::types::{BranchId, ChecklistId, LeadId};
use smallvec::smallvec;

use crate::environment::BanquetEnvironment;

/// Operations on the lead record store
#[derive(Clone, Debug)]
pub struct LeadDesk {
    env: BanquetEnvironment,
}

impl LeadDesk {
    /// Creates the service
    #[must_use]
    pub const fn new(env: BanquetEnvironment) -> Self {
        Self { env }
    }

    /// Captures a lead in status `new` together with its empty checklist.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`] for a blank client name or zero guests
    /// - [`BookingError::Storage`] if the repository fails
    #[tracing::instrument(skip(self, new_lead), fields(branch_id = %new_lead.branch_id))]
    pub async fn create_lead(&self, new_lead: NewLead) -> Result<Lead, BookingError> {
        new_lead.validate()?;

        let branch_id = new_lead.branch_id;
        let lead = new_lead.into_lead(LeadId::new(), self.env.clock.now());
        let checklist = Checklist::new(ChecklistId::new(), &lead);

        let _gate = self.env.gates.enter(branch_id).await;
        self.env.repository.insert_lead(lead.clone(), checklist).await?;
        self.env.publish(
            branch_id,
            smallvec![ChangeEvent::LeadCreated { lead: lead.clone() }],
        );

        tracing::info!(lead_id = %lead.id, "Lead created");
        metrics::counter!("banquet.leads.created").increment(1);
        Ok(lead)
    }

    /// Moves a lead through the funnel.
    ///
    /// Forward moves may skip stages; backward moves are rejected; `lost` is
    /// allowed from any open status. `advance_paid` is only reachable by
    /// completing the advance payment.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown lead
    /// - [`BookingError::InvalidTransition`] if the transition table forbids the move
    #[tracing::instrument(skip(self))]
    pub async fn update_lead_status(
        &self,
        lead_id: LeadId,
        status: LeadStatus,
    ) -> Result<Lead, BookingError> {
        let branch_id = self.env.repository.lead(lead_id).await?.branch_id;
        let at = self.env.clock.now();

        let _gate = self.env.gates.enter(branch_id).await;
        let updated = self
            .env
            .repository
            .update_lead(
                lead_id,
                Box::new(move |lead: &mut Lead| lead.transition_to(status, at)),
            )
            .await
            .inspect_err(|e| tracing::debug!(error = %e, "Lead status update rejected"))?;

        let from = updated.before.status;
        self.env.publish(
            branch_id,
            smallvec![ChangeEvent::LeadStatusChanged {
                lead: updated.after.clone(),
                from,
            }],
        );

        tracing::info!(from = %from, to = %status, "Lead status changed");
        if status == LeadStatus::Lost {
            metrics::counter!("banquet.leads.lost").increment(1);
        }
        Ok(updated.after)
    }

    /// Loads a lead.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown lead.
    pub async fn get_lead(&self, lead_id: LeadId) -> Result<Lead, BookingError> {
        self.env.repository.lead(lead_id).await
    }

    /// All leads of a branch, oldest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    pub async fn leads_for_branch(&self, branch_id: BranchId) -> Result<Vec<Lead>, BookingError> {
        self.env.repository.leads_for_branch(branch_id).await
    }

    /// Lead counts per status and the conversion rate, computed from the store.
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] if the repository fails.
    #[tracing::instrument(skip(self))]
    pub async fn funnel(&self, branch_id: BranchId) -> Result<FunnelStats, BookingError> {
        let counts = self.env.repository.lead_status_counts(branch_id).await?;
        Ok(FunnelStats::from_counts(branch_id, &counts))
    }
}
