//! Integration tests for branch-scoped change notifications.
//!
//! Observers subscribe per branch, receive that branch's changes in commit
//! order, and stop receiving when they unsubscribe.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use banquet_core::booking::BookingStatus;
use banquet_core::environment::Clock;
use banquet_core::notification::{ChangeEvent, NotifyError};
use banquet_core::types::{BranchId, Money};
use banquet_runtime::{BanquetCore, BanquetEnvironment, BroadcastNotifier, InMemoryRepository};
use banquet_testing::helpers::{
    BookingRequestBuilder, LeadBuilder, assert_quiet, next_notification, test_core,
};
use banquet_testing::test_clock;
use std::sync::Arc;

#[tokio::test]
async fn test_observer_sees_only_its_branch_in_commit_order() {
    let core = test_core();
    let branch_x = BranchId::new();
    let branch_y = BranchId::new();
    let mut observer = core.subscribe(branch_x);

    let booking = core
        .create_booking(BookingRequestBuilder::new().branch(branch_x).build())
        .await
        .unwrap();
    core.create_booking(BookingRequestBuilder::new().branch(branch_y).build())
        .await
        .unwrap();
    core.create_lead(LeadBuilder::new().branch(branch_y).build())
        .await
        .unwrap();
    core.record_payment(booking.id, Money::from_rupees(10_000))
        .await
        .unwrap();
    core.update_booking_status(booking.id, BookingStatus::Completed)
        .await
        .unwrap();

    let first = next_notification(&mut observer).await;
    let second = next_notification(&mut observer).await;
    let third = next_notification(&mut observer).await;
    assert_quiet(&mut observer).await;

    for notification in [&first, &second, &third] {
        assert_eq!(notification.branch_id, branch_x);
        assert_eq!(notification.occurred_at, test_clock().now());
    }
    assert_eq!(second.sequence, first.sequence + 1);
    assert_eq!(third.sequence, second.sequence + 1);

    assert!(matches!(first.event, ChangeEvent::BookingCreated { .. }));
    match (&second.event, &third.event) {
        (
            ChangeEvent::BookingUpdated { booking: paid },
            ChangeEvent::BookingUpdated { booking: completed },
        ) => {
            assert_eq!(paid.advance_amount, Money::from_rupees(110_000));
            assert_eq!(completed.status, BookingStatus::Completed);
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test]
async fn test_unsubscribed_observer_receives_nothing_further() {
    let core = test_core();
    let branch = BranchId::new();
    let mut observer = core.subscribe(branch);
    let mut other = core.subscribe(branch);

    core.create_lead(LeadBuilder::new().branch(branch).build())
        .await
        .unwrap();
    next_notification(&mut observer).await;
    next_notification(&mut other).await;

    assert!(core.unsubscribe(observer.id()));
    assert!(!core.unsubscribe(observer.id()));

    core.create_lead(LeadBuilder::new().branch(branch).build())
        .await
        .unwrap();

    // The ended stream yields nothing, while the other observer still gets the change
    assert!(observer.recv().await.is_none());
    assert!(matches!(
        next_notification(&mut other).await.event,
        ChangeEvent::LeadCreated { .. }
    ));
}

#[tokio::test]
async fn test_writes_succeed_without_observers() {
    let core = test_core();
    let branch = BranchId::new();
    let booking = core
        .create_booking(BookingRequestBuilder::new().branch(branch).build())
        .await
        .unwrap();

    // A late subscriber gets no backfill
    let mut late = core.subscribe(branch);
    assert_quiet(&mut late).await;
    assert_eq!(booking.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_slow_observer_is_told_it_lagged() {
    let env = BanquetEnvironment::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(BroadcastNotifier::new(2)),
        Arc::new(test_clock()),
    );
    let core = BanquetCore::new(env);
    let branch = BranchId::new();
    let mut observer = core.subscribe(branch);

    for _ in 0..5 {
        core.create_lead(LeadBuilder::new().branch(branch).build())
            .await
            .unwrap();
    }

    match observer.recv().await {
        Some(Err(NotifyError::Lagged(missed))) => assert_eq!(missed, 3),
        other => panic!("expected a lag signal, got {other:?}"),
    }
    // After the signal the observer resumes with the oldest retained change
    let resumed = next_notification(&mut observer).await;
    assert!(matches!(resumed.event, ChangeEvent::LeadCreated { .. }));
}

#[tokio::test]
async fn test_notification_serializes_to_tagged_json() {
    let core = test_core();
    let branch = BranchId::new();
    let mut observer = core.subscribe(branch);
    core.create_lead(LeadBuilder::new().branch(branch).build())
        .await
        .unwrap();

    let json = next_notification(&mut observer).await.to_json().unwrap();
    assert!(json.contains(r#""type":"lead_created""#), "{json}");
    assert!(json.contains(&branch.to_string()));
}
