//! # Banquet Testing
//!
//! Testing utilities for the banquet booking core.
//!
//! This crate provides:
//! - A fixed clock for deterministic timestamps
//! - Builders for leads and booking requests
//! - A Given-When-Then harness for booking scenarios
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```
//! use banquet_testing::helpers::{BookingRequestBuilder, test_core};
//!
//! # async fn example() {
//! let core = test_core();
//! let request = BookingRequestBuilder::new().at("18:00").build();
//! let booking = core.create_booking(request).await;
//! assert!(booking.is_ok());
//! # }
//! ```

use banquet_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod scenario;

pub use scenario::ScenarioTest;

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use banquet_testing::mocks::FixedClock;
    /// use banquet_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a literal.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Builders and fixtures
pub mod helpers {
    #![allow(clippy::expect_used, clippy::missing_panics_doc)]

    use banquet_core::booking::BookingRequest;
    use banquet_core::lead::NewLead;
    use banquet_core::notification::{ChangeNotification, Subscription};
    use banquet_core::types::{BranchId, ContactInfo, HallName, Money, SalespersonId, parse_event_time};
    use banquet_runtime::{BanquetCore, BanquetEnvironment, BroadcastNotifier, InMemoryRepository};
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::mocks::test_clock;

    /// Hall used by builders unless overridden
    pub const DEFAULT_HALL: &str = "Grand Ballroom";

    /// Calendar date from literals
    #[must_use]
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    /// Event time from `HH:MM`
    #[must_use]
    pub fn time(hhmm: &str) -> NaiveTime {
        parse_event_time(hhmm).expect("valid test time")
    }

    /// Hall name from a literal
    #[must_use]
    pub fn hall(name: &str) -> HallName {
        HallName::new(name).expect("valid test hall")
    }

    /// In-memory environment with the fixed test clock
    #[must_use]
    pub fn test_environment() -> BanquetEnvironment {
        BanquetEnvironment::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(BroadcastNotifier::default()),
            Arc::new(test_clock()),
        )
    }

    /// Booking core over [`test_environment`]
    #[must_use]
    pub fn test_core() -> BanquetCore {
        BanquetCore::new(test_environment())
    }

    /// Waits up to one second for the next notification.
    ///
    /// # Panics
    ///
    /// If nothing arrives, the stream ends, or the subscriber lagged.
    pub async fn next_notification(subscription: &mut Subscription) -> ChangeNotification {
        tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .expect("notification within a second")
            .expect("subscription still open")
            .expect("subscriber kept up")
    }

    /// Asserts nothing is pending on `subscription` right now.
    ///
    /// # Panics
    ///
    /// If a notification is waiting.
    pub async fn assert_quiet(subscription: &mut Subscription) {
        let pending = tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await;
        assert!(pending.is_err(), "unexpected notification: {pending:?}");
    }

    /// Builder for [`BookingRequest`].
    ///
    /// Defaults to the Grand Ballroom on 2025-03-10 at 18:00, 200 guests,
    /// ₹5,00,000 total and ₹1,00,000 advance.
    #[derive(Clone, Debug)]
    pub struct BookingRequestBuilder {
        request: BookingRequest,
    }

    impl BookingRequestBuilder {
        /// Request with the defaults above for a fresh branch
        #[must_use]
        pub fn new() -> Self {
            Self {
                request: BookingRequest {
                    branch_id: BranchId::new(),
                    hall: hall(DEFAULT_HALL),
                    event_date: date(2025, 3, 10),
                    event_time: time("18:00"),
                    guest_count: 200,
                    total_amount: Money::from_rupees(500_000),
                    advance_amount: Money::from_rupees(100_000),
                    client: ContactInfo::new("Asha Rao", "9800000000"),
                },
            }
        }

        /// Sets the branch
        #[must_use]
        pub const fn branch(mut self, branch_id: BranchId) -> Self {
            self.request.branch_id = branch_id;
            self
        }

        /// Sets the hall
        #[must_use]
        pub fn hall(mut self, name: &str) -> Self {
            self.request.hall = hall(name);
            self
        }

        /// Sets the event date
        #[must_use]
        pub const fn on(mut self, event_date: NaiveDate) -> Self {
            self.request.event_date = event_date;
            self
        }

        /// Sets the event time from `HH:MM`
        #[must_use]
        pub fn at(mut self, hhmm: &str) -> Self {
            self.request.event_time = time(hhmm);
            self
        }

        /// Sets total and advance, in rupees
        #[must_use]
        pub const fn amounts(mut self, total: u64, advance: u64) -> Self {
            self.request.total_amount = Money::from_rupees(total);
            self.request.advance_amount = Money::from_rupees(advance);
            self
        }

        /// Sets the guest count
        #[must_use]
        pub const fn guests(mut self, guest_count: u32) -> Self {
            self.request.guest_count = guest_count;
            self
        }

        /// Sets the client name
        #[must_use]
        pub fn client(mut self, name: &str) -> Self {
            self.request.client = ContactInfo::new(name, "9800000000");
            self
        }

        /// The request
        #[must_use]
        pub fn build(self) -> BookingRequest {
            self.request
        }
    }

    impl Default for BookingRequestBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Builder for [`NewLead`].
    ///
    /// Defaults to 150 guests on 2025-05-02 for a fresh branch.
    #[derive(Clone, Debug)]
    pub struct LeadBuilder {
        lead: NewLead,
    }

    impl LeadBuilder {
        /// Lead with the defaults above
        #[must_use]
        pub fn new() -> Self {
            Self {
                lead: NewLead {
                    branch_id: BranchId::new(),
                    salesperson_id: SalespersonId::new(),
                    contact: ContactInfo::new("Ravi Menon", "9811111111"),
                    event_date: date(2025, 5, 2),
                    guest_count: 150,
                    estimated_budget: None,
                    notes: None,
                },
            }
        }

        /// Sets the branch
        #[must_use]
        pub const fn branch(mut self, branch_id: BranchId) -> Self {
            self.lead.branch_id = branch_id;
            self
        }

        /// Sets the event date
        #[must_use]
        pub const fn on(mut self, event_date: NaiveDate) -> Self {
            self.lead.event_date = event_date;
            self
        }

        /// Sets the guest count
        #[must_use]
        pub const fn guests(mut self, guest_count: u32) -> Self {
            self.lead.guest_count = guest_count;
            self
        }

        /// Sets the client name
        #[must_use]
        pub fn client(mut self, name: &str) -> Self {
            self.lead.contact = ContactInfo::new(name, "9811111111");
            self
        }

        /// Sets the estimated budget, in rupees
        #[must_use]
        pub const fn budget(mut self, rupees: u64) -> Self {
            self.lead.estimated_budget = Some(Money::from_rupees(rupees));
            self
        }

        /// The new lead
        #[must_use]
        pub fn build(self) -> NewLead {
            self.lead
        }
    }

    impl Default for LeadBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Routes `tracing` output to the test harness. Safe to call repeatedly.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use banquet_core::booking::BookingStatus;
    use banquet_core::checklist::Milestone;
    use banquet_core::lead::LeadStatus;
    use banquet_core::types::{HallName, Money};
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;

    /// Any lead status
    pub fn lead_status() -> impl Strategy<Value = LeadStatus> {
        proptest::sample::select(LeadStatus::ALL.to_vec())
    }

    /// Any booking status
    pub fn booking_status() -> impl Strategy<Value = BookingStatus> {
        proptest::sample::select(BookingStatus::ALL.to_vec())
    }

    /// Any milestone
    pub fn milestone() -> impl Strategy<Value = Milestone> {
        proptest::sample::select(Milestone::ALL.to_vec())
    }

    /// Positive amounts up to ₹1 crore
    pub fn money() -> impl Strategy<Value = Money> {
        (1_u64..=1_000_000_000).prop_map(Money::from_paise)
    }

    /// One of a few hall names, so generated bookings collide often
    pub fn hall() -> impl Strategy<Value = HallName> {
        proptest::sample::select(vec!["Grand Ballroom", "Lotus Hall", "Garden Lawn"])
            .prop_filter_map("valid hall", |name| HallName::new(name).ok())
    }

    /// Days in March 2025
    pub fn event_date() -> impl Strategy<Value = NaiveDate> {
        (1_u32..=31).prop_filter_map("valid date", |day| NaiveDate::from_ymd_opt(2025, 3, day))
    }

    /// Whole and half hours of the day
    pub fn event_time() -> impl Strategy<Value = NaiveTime> {
        (0_u32..24, prop_oneof![Just(0_u32), Just(30_u32)])
            .prop_filter_map("valid time", |(h, m)| NaiveTime::from_hms_opt(h, m, 0))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use helpers::{BookingRequestBuilder, LeadBuilder};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_builders_produce_valid_input() {
        assert!(BookingRequestBuilder::new().build().validate().is_ok());
        assert!(LeadBuilder::new().build().validate().is_ok());
    }
}
