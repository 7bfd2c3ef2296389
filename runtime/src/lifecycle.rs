//! Booking creation, lead conversion and booking status/amount changes.

use banquet_core::booking::{Booking, BookingRequest, BookingStatus};
use banquet_core::checklist::{Checklist, ConversionTerms};
use banquet_core::error::BookingError;
use banquet_core::lead::Lead;
use banquet_core::notification::ChangeEvent;
use banquet_core::repository::{BookingMutation, ConversionOutcome, ConversionPlan};
use banquet_core::types::{BookingId, BranchId, HallName, LeadId, Money};
use chrono::{NaiveDate, NaiveTime};
use smallvec::smallvec;

use crate::environment::{BanquetEnvironment, record_conflict};

/// Commits a conversion plan for `lead_id` under the lead's branch gate and
/// publishes what it produced.
///
/// Shared by [`BookingLifecycle::convert_lead_to_booking`] and the checklist
/// engine's advance-payment gate.
pub(crate) async fn commit_conversion(
    env: &BanquetEnvironment,
    lead_id: LeadId,
    plan: ConversionPlan,
) -> Result<ConversionOutcome, BookingError> {
    let branch_id = env.repository.lead(lead_id).await?.branch_id;
    let _gate = env.gates.enter(branch_id).await;

    // Lead changes are serialized by the branch gate, so this status is current
    let from = env.repository.lead(lead_id).await?.status;

    let outcome = match env.repository.convert_lead(lead_id, plan).await {
        Ok(outcome) => outcome,
        Err(error) => {
            let error = env.resolve_slot_error(error).await;
            if error.is_double_booking() {
                record_conflict(error.conflict());
            }
            return Err(error);
        }
    };

    if let Some(booking) = &outcome.booking {
        env.publish(
            branch_id,
            smallvec![
                ChangeEvent::ChecklistUpdated {
                    checklist: outcome.checklist.clone(),
                },
                ChangeEvent::LeadStatusChanged {
                    lead: outcome.lead.clone(),
                    from,
                },
                ChangeEvent::LeadConverted {
                    lead_id,
                    booking_id: booking.id,
                    amount: booking.advance_amount,
                },
                ChangeEvent::BookingCreated {
                    booking: booking.clone(),
                },
            ],
        );
        tracing::info!(
            lead_id = %lead_id,
            booking_id = %booking.id,
            advance = %booking.advance_amount,
            total = %booking.total_amount,
            "Lead converted to booking"
        );
        metrics::counter!("banquet.conversions").increment(1);
        metrics::counter!("banquet.bookings.created", "source" => "conversion").increment(1);
    } else {
        tracing::debug!(lead_id = %lead_id, "Advance payment already recorded; nothing to convert");
    }

    Ok(outcome)
}

/// Booking record store operations
#[derive(Clone, Debug)]
pub struct BookingLifecycle {
    env: BanquetEnvironment,
}

impl BookingLifecycle {
    /// Creates the service
    #[must_use]
    pub const fn new(env: BanquetEnvironment) -> Self {
        Self { env }
    }

    /// Creates a confirmed booking if its slot is free.
    ///
    /// The slot check and the insert happen in one atomic storage operation.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidAmount`] if the total is zero or the advance exceeds it
    /// - [`BookingError::Validation`] for zero guests or a blank client name
    /// - [`BookingError::DoubleBooking`] naming the booking that holds the slot
    #[tracing::instrument(skip(self, request), fields(slot = %request.conflict_key()))]
    pub async fn create_booking(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        request.validate()?;
        let branch_id = request.branch_id;
        let booking = request.into_booking(BookingId::new(), None, self.env.clock.now())?;

        let _gate = self.env.gates.enter(branch_id).await;
        let booking = match self.env.repository.insert_booking(booking).await {
            Ok(booking) => booking,
            Err(error) => {
                let error = self.env.resolve_slot_error(error).await;
                if error.is_double_booking() {
                    record_conflict(error.conflict());
                }
                return Err(error);
            }
        };

        self.env.publish(
            branch_id,
            smallvec![ChangeEvent::BookingCreated {
                booking: booking.clone(),
            }],
        );
        tracing::info!(booking_id = %booking.id, balance = %booking.balance_amount, "Booking confirmed");
        metrics::counter!("banquet.bookings.created", "source" => "direct").increment(1);
        Ok(booking)
    }

    /// Converts a lead into a confirmed booking.
    ///
    /// `total` is quoted before tax; the booking's total adds 18% GST. The
    /// booking uses the lead's event date, guest count and contact. In the same
    /// atomic operation the lead moves to `advance_paid` and its checklist's
    /// `advance_payment` milestone records `advance`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown lead
    /// - [`BookingError::InvalidTransition`] if the lead is already `advance_paid` or `lost`
    /// - [`BookingError::InvalidAmount`] if `advance` is zero or exceeds the GST-inclusive total
    /// - [`BookingError::DoubleBooking`] if the slot is taken; nothing is changed
    #[tracing::instrument(skip(self, hall), fields(hall = %hall))]
    pub async fn convert_lead_to_booking(
        &self,
        lead_id: LeadId,
        hall: HallName,
        event_time: NaiveTime,
        advance: Money,
        total: Money,
    ) -> Result<Booking, BookingError> {
        let at = self.env.clock.now();
        let booking_id = BookingId::new();
        let terms = ConversionTerms::new(hall, event_time, total);

        let plan: ConversionPlan = Box::new(move |lead: &mut Lead, checklist: &mut Checklist| {
            lead.convert(at)?;
            let request = terms.into_request(lead, advance)?;
            checklist.mark_advance_payment(advance, at)?;
            request.into_booking(booking_id, Some(lead.id), at).map(Some)
        });

        let outcome = commit_conversion(&self.env, lead_id, plan).await?;
        outcome.booking.ok_or_else(|| {
            BookingError::Storage(format!("Conversion of lead {lead_id} produced no booking"))
        })
    }

    /// Completes or cancels a confirmed booking, releasing its slot.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown booking
    /// - [`BookingError::InvalidTransition`] unless the booking is confirmed and
    ///   `status` is `completed` or `cancelled`
    #[tracing::instrument(skip(self))]
    pub async fn update_booking_status(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let at = self.env.clock.now();
        let booking = self
            .mutate(
                booking_id,
                Box::new(move |booking: &mut Booking| booking.transition_to(status, at)),
            )
            .await?;
        tracing::info!(status = %status, "Booking status changed");
        metrics::counter!("banquet.bookings.status_changed", "status" => status.as_str())
            .increment(1);
        Ok(booking)
    }

    /// Adds a received payment to a confirmed booking's advance.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown booking
    /// - [`BookingError::InvalidTransition`] if the booking is not confirmed
    /// - [`BookingError::InvalidAmount`] if the amount is zero or exceeds the balance
    #[tracing::instrument(skip(self))]
    pub async fn record_payment(
        &self,
        booking_id: BookingId,
        amount: Money,
    ) -> Result<Booking, BookingError> {
        let at = self.env.clock.now();
        let booking = self
            .mutate(
                booking_id,
                Box::new(move |booking: &mut Booking| booking.record_payment(amount, at)),
            )
            .await?;
        tracing::info!(amount = %amount, balance = %booking.balance_amount, "Payment recorded");
        Ok(booking)
    }

    /// Changes the total of a confirmed booking.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] for an unknown booking
    /// - [`BookingError::InvalidTransition`] if the booking is not confirmed
    /// - [`BookingError::InvalidAmount`] if the total is zero or below the amount received
    #[tracing::instrument(skip(self))]
    pub async fn revise_total(
        &self,
        booking_id: BookingId,
        new_total: Money,
    ) -> Result<Booking, BookingError> {
        let at = self.env.clock.now();
        self.mutate(
            booking_id,
            Box::new(move |booking: &mut Booking| booking.revise_total(new_total, at)),
        )
        .await
    }

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown booking.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.env.repository.booking(booking_id).await
    }

    /// Bookings of every status within `from..=to`, ordered by date and time.
    ///
    /// # Errors
    ///
    /// [`BookingError::Validation`] if `from` is after `to`.
    pub async fn bookings_for_branch(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Booking>, BookingError> {
        if from > to {
            return Err(BookingError::Validation(format!(
                "Range start {from} is after its end {to}"
            )));
        }
        self.env.repository.bookings_for_branch(branch_id, from, to).await
    }

    async fn mutate(
        &self,
        booking_id: BookingId,
        mutation: BookingMutation,
    ) -> Result<Booking, BookingError> {
        let branch_id = self.env.repository.booking(booking_id).await?.branch_id;

        let _gate = self.env.gates.enter(branch_id).await;
        let updated = self
            .env
            .repository
            .update_booking(booking_id, mutation)
            .await
            .inspect_err(|e| tracing::debug!(error = %e, "Booking change rejected"))?;

        self.env.publish(
            branch_id,
            smallvec![ChangeEvent::BookingUpdated {
                booking: updated.after.clone(),
            }],
        );
        Ok(updated.after)
    }
}
