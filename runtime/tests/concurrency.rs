//! Concurrent writers racing for the same slot.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use banquet_core::checklist::{ConversionTerms, Milestone, MilestoneUpdate};
use banquet_core::environment::Clock;
use banquet_core::error::BookingError;
use banquet_core::lead::LeadStatus;
use banquet_core::types::{BranchId, Money};
use banquet_testing::helpers::{
    BookingRequestBuilder, LeadBuilder, date, hall, init_test_tracing, test_core, time,
};
use banquet_testing::test_clock;
use futures::future::join_all;

const WRITERS: usize = 32;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_one_slot_yield_one_booking() {
    init_test_tracing();
    let core = test_core();
    let branch = BranchId::new();

    let attempts = (0..WRITERS).map(|i| {
        let core = core.clone();
        let request = BookingRequestBuilder::new()
            .branch(branch)
            .at("18:00")
            .client(&format!("Client {i}"))
            .build();
        tokio::spawn(async move { core.create_booking(request).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task completed"))
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0];

    for result in &results {
        if let Err(err) = result {
            match err {
                BookingError::DoubleBooking(conflict) => {
                    assert_eq!(conflict.booking_id, winner.id);
                }
                other => panic!("unexpected error {other}"),
            }
        }
    }

    let stored = core
        .bookings_for_branch(branch, date(2025, 3, 10), date(2025, 3, 10))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_slots_in_other_branches_do_not_contend() {
    let core = test_core();

    let attempts = (0..WRITERS).map(|_| {
        let core = core.clone();
        let request = BookingRequestBuilder::new().at("18:00").build();
        tokio::spawn(async move { core.create_booking(request).await })
    });
    let results = join_all(attempts).await;

    assert!(results.into_iter().all(|joined| joined.unwrap().is_ok()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_advance_payments_convert_once() {
    let core = test_core();
    let branch = BranchId::new();
    let lead = core
        .create_lead(LeadBuilder::new().branch(branch).build())
        .await
        .unwrap();
    let checklist = core.checklist_for_lead(lead.id).await.unwrap();

    let attempts = (0..8).map(|_| {
        let core = core.clone();
        let update = MilestoneUpdate::complete(Milestone::AdvancePayment, test_clock().now())
            .with_amount(Money::from_rupees(50_000))
            .with_terms(ConversionTerms::new(
                hall("Lotus Hall"),
                time("19:30"),
                Money::from_rupees(200_000),
            ));
        tokio::spawn(async move { core.complete_milestone(checklist.id, update).await })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let created = outcomes.iter().filter(|o| o.booking.is_some()).count();
    assert_eq!(created, 1);
    assert_eq!(
        core.get_lead(lead.id).await.unwrap().status,
        LeadStatus::AdvancePaid
    );

    let bookings = core
        .bookings_for_branch(branch, date(2025, 1, 1), date(2025, 12, 31))
        .await
        .unwrap();
    assert_eq!(bookings.len(), 1);
}
