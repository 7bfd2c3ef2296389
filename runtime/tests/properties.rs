//! Property tests for slot conflicts, status machines, balances and occupancy.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use banquet_core::booking::{Booking, BookingRequest, BookingStatus};
use banquet_core::checklist::{Milestone, MilestoneUpdate};
use banquet_core::environment::Clock;
use banquet_core::error::BookingError;
use banquet_core::lead::LeadStatus;
use banquet_core::occupancy::OccupancyLevel;
use banquet_core::types::{BookingId, BranchId, ContactInfo, HallName, LeadId, Money};
use banquet_testing::helpers::{LeadBuilder, test_core};
use banquet_testing::{properties, test_clock};
use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn request(branch_id: BranchId, hall: HallName, date: NaiveDate, time: NaiveTime) -> BookingRequest {
    BookingRequest {
        branch_id,
        hall,
        event_date: date,
        event_time: time,
        guest_count: 100,
        total_amount: Money::from_rupees(300_000),
        advance_amount: Money::from_rupees(50_000),
        client: ContactInfo::new("Client", "9800000000"),
    }
}

fn confirmed_booking(total: Money, advance: Money) -> Booking {
    let mut request = request(
        BranchId::new(),
        HallName::new("Grand Ballroom").unwrap(),
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    );
    request.total_amount = total;
    request.advance_amount = advance;
    request
        .into_booking(BookingId::new(), None, test_clock().now())
        .unwrap()
}

fn funnel_position(status: LeadStatus) -> usize {
    LeadStatus::ALL
        .iter()
        .position(|s| *s == status)
        .unwrap()
}

#[derive(Clone, Debug)]
enum AmountChange {
    Payment(Money),
    Revise(Money),
}

/// Completes or reopens a milestone other than the advance payment
fn plain_update() -> impl Strategy<Value = MilestoneUpdate> {
    (
        properties::milestone().prop_filter("not the gate", |m| *m != Milestone::AdvancePayment),
        any::<bool>(),
        properties::money(),
    )
        .prop_map(|(milestone, complete, amount)| {
            if !complete {
                return MilestoneUpdate::reopen(milestone);
            }
            let update = MilestoneUpdate::complete(milestone, test_clock().now());
            if milestone == Milestone::FullPayment {
                update.with_amount(amount)
            } else {
                update
            }
        })
}

fn amount_change() -> impl Strategy<Value = AmountChange> {
    prop_oneof![
        properties::money().prop_map(AmountChange::Payment),
        properties::money().prop_map(AmountChange::Revise),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A second confirmed request collides iff branch, hall, date and time all match
    #[test]
    fn prop_conflicts_are_exact(
        same_branch in any::<bool>(),
        first in (properties::hall(), properties::event_date(), properties::event_time()),
        second in (properties::hall(), properties::event_date(), properties::event_time()),
    ) {
        let branch = BranchId::new();
        let other_branch = if same_branch { branch } else { BranchId::new() };
        let (hall_a, date_a, time_a) = first;
        let (hall_b, date_b, time_b) = second;
        let same_key = same_branch && hall_a == hall_b && date_a == date_b && time_a == time_b;

        let (holder, outcome) = runtime().block_on(async {
            let core = test_core();
            let holder = core
                .create_booking(request(branch, hall_a, date_a, time_a))
                .await
                .unwrap();
            let outcome = core
                .create_booking(request(other_branch, hall_b, date_b, time_b))
                .await;
            (holder, outcome)
        });

        match outcome {
            Err(BookingError::DoubleBooking(conflict)) => {
                prop_assert!(same_key);
                prop_assert_eq!(conflict.booking_id, holder.id);
            }
            Ok(_) => prop_assert!(!same_key),
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }

    /// Booking status only ever leaves `confirmed`, and only once
    #[test]
    fn prop_booking_status_is_monotonic(
        steps in proptest::collection::vec(properties::booking_status(), 1..8),
    ) {
        let mut booking = confirmed_booking(Money::from_rupees(100), Money::from_rupees(10));
        let at = test_clock().now();

        for next in steps {
            let before = booking.status;
            let result = booking.transition_to(next, at);
            prop_assert_eq!(result.is_ok(), before.can_transition_to(next));
            if result.is_err() {
                prop_assert_eq!(booking.status, before);
            }
            if before != BookingStatus::Confirmed {
                prop_assert_ne!(booking.status, BookingStatus::Confirmed);
            }
        }
    }

    /// Plain lead updates never move backwards and never reach `advance_paid`
    #[test]
    fn prop_lead_status_never_regresses(
        steps in proptest::collection::vec(properties::lead_status(), 1..10),
    ) {
        let at = test_clock().now();
        let mut lead = LeadBuilder::new().build().into_lead(LeadId::new(), at);

        for next in steps {
            let before = lead.status;
            if lead.transition_to(next, at).is_ok() {
                prop_assert!(
                    next == LeadStatus::Lost || funnel_position(next) > funnel_position(before)
                );
                prop_assert_ne!(lead.status, LeadStatus::AdvancePaid);
            } else {
                prop_assert_eq!(lead.status, before);
            }
        }
    }

    /// `balance == total - advance` holds after every accepted or rejected change
    #[test]
    fn prop_balance_matches_total_minus_advance(
        total in properties::money(),
        changes in proptest::collection::vec(amount_change(), 1..12),
    ) {
        let mut booking = confirmed_booking(total, Money::ZERO);
        let at = test_clock().now();

        for change in changes {
            let before = booking.clone();
            let result = match change {
                AmountChange::Payment(amount) => booking.record_payment(amount, at),
                AmountChange::Revise(new_total) => booking.revise_total(new_total, at),
            };
            if result.is_err() {
                prop_assert_eq!(&booking, &before);
            }
            prop_assert!(booking.advance_amount <= booking.total_amount);
            prop_assert_eq!(
                booking.total_amount.checked_sub(booking.advance_amount),
                Some(booking.balance_amount)
            );
        }
    }

    /// Plain milestone updates never move the lead or create bookings
    #[test]
    fn prop_plain_milestones_leave_lead_alone(
        updates in proptest::collection::vec(plain_update(), 1..12),
    ) {
        let (status, booking_count) = runtime().block_on(async {
            let core = test_core();
            let branch = BranchId::new();
            let lead = core
                .create_lead(LeadBuilder::new().branch(branch).build())
                .await
                .unwrap();
            let checklist = core.checklist_for_lead(lead.id).await.unwrap();
            for update in updates {
                let outcome = core.complete_milestone(checklist.id, update).await.unwrap();
                assert!(outcome.booking.is_none());
            }
            let status = core.get_lead(lead.id).await.unwrap().status;
            let bookings = core
                .bookings_for_branch(
                    branch,
                    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
                )
                .await
                .unwrap();
            (status, bookings.len())
        });

        prop_assert_eq!(status, LeadStatus::New);
        prop_assert_eq!(booking_count, 0);
    }

    /// Classifying twice without writes gives the same answer, derived from the count
    #[test]
    fn prop_classification_is_idempotent(
        slots in proptest::collection::vec((properties::hall(), properties::event_time()), 0..6),
    ) {
        let branch = BranchId::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let probe = HallName::new("Grand Ballroom").unwrap();

        let (first, second, confirmed) = runtime().block_on(async {
            let core = test_core();
            let mut confirmed = 0;
            for (hall, time) in slots {
                let is_probe = hall == probe;
                if core.create_booking(request(branch, hall, date, time)).await.is_ok() && is_probe {
                    confirmed += 1;
                }
            }
            let first = core.classify(branch, &probe, date).await.unwrap();
            let second = core.classify(branch, &probe, date).await.unwrap();
            (first, second, confirmed)
        });

        prop_assert_eq!(first, second);
        prop_assert_eq!(first, OccupancyLevel::from_count(confirmed));
    }
}
