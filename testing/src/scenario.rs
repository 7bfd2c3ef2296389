//! Given-When-Then harness for booking scenarios.

#![allow(clippy::module_name_repetitions)]

use banquet_core::booking::{Booking, BookingRequest};
use banquet_core::error::BookingError;
use banquet_runtime::BanquetCore;

use crate::helpers::test_core;

/// Assertion on the outcome of the request under test
type OutcomeAssertion = Box<dyn FnOnce(&Result<Booking, BookingError>)>;

/// Fluent API for booking scenarios
///
/// # Example
///
/// ```
/// use banquet_testing::ScenarioTest;
/// use banquet_testing::helpers::BookingRequestBuilder;
///
/// # async fn example() {
/// let first = BookingRequestBuilder::new().at("18:00");
/// ScenarioTest::new()
///     .given_booking(first.clone().build())
///     .when_booking(first.client("Vikram Shah").build())
///     .then_outcome(|outcome| assert!(outcome.is_err()))
///     .run()
///     .await;
/// # }
/// ```
pub struct ScenarioTest {
    core: BanquetCore,
    given: Vec<BookingRequest>,
    request: Option<BookingRequest>,
    outcome_assertions: Vec<OutcomeAssertion>,
}

impl ScenarioTest {
    /// Scenario over a fresh [`test_core`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_core(test_core())
    }

    /// Scenario over an existing core
    #[must_use]
    pub const fn with_core(core: BanquetCore) -> Self {
        Self {
            core,
            given: Vec::new(),
            request: None,
            outcome_assertions: Vec::new(),
        }
    }

    /// A booking that must already exist (Given)
    #[must_use]
    pub fn given_booking(mut self, request: BookingRequest) -> Self {
        self.given.push(request);
        self
    }

    /// The request under test (When)
    #[must_use]
    pub fn when_booking(mut self, request: BookingRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Add an assertion about the outcome (Then)
    #[must_use]
    pub fn then_outcome<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&Result<Booking, BookingError>) + 'static,
    {
        self.outcome_assertions.push(Box::new(assertion));
        self
    }

    /// Runs the scenario and all assertions.
    ///
    /// Returns the core and the given bookings for follow-up checks.
    ///
    /// # Panics
    ///
    /// Panics if no request was set, if a given booking fails, or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub async fn run(self) -> (BanquetCore, Vec<Booking>) {
        let mut given = Vec::with_capacity(self.given.len());
        for request in self.given {
            let booking = self
                .core
                .create_booking(request)
                .await
                .unwrap_or_else(|e| panic!("given booking failed: {e}"));
            given.push(booking);
        }

        let request = self.request.expect("Request must be set with when_booking()");
        let outcome = self.core.create_booking(request).await;

        for assertion in self.outcome_assertions {
            assertion(&outcome);
        }
        (self.core, given)
    }
}

impl Default for ScenarioTest {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper assertions for outcomes
pub mod assertions {
    use banquet_core::booking::Booking;
    use banquet_core::error::BookingError;

    /// Assert the request was rejected as a double booking held by `holder`
    ///
    /// # Panics
    ///
    /// Panics if the outcome is anything else
    #[allow(clippy::panic)] // Test assertion helper
    pub fn assert_double_booking(outcome: &Result<Booking, BookingError>, holder: &Booking) {
        match outcome {
            Err(BookingError::DoubleBooking(conflict)) => {
                assert_eq!(conflict.booking_id, holder.id, "wrong slot holder");
                assert_eq!(conflict.key, holder.conflict_key());
            }
            other => panic!("expected a double booking, got {other:?}"),
        }
    }

    /// Assert the request produced a confirmed booking
    ///
    /// # Panics
    ///
    /// Panics if the outcome is an error or the booking is not confirmed
    #[allow(clippy::panic)] // Test assertion helper
    pub fn assert_confirmed(outcome: &Result<Booking, BookingError>) {
        match outcome {
            Ok(booking) => assert!(booking.status.holds_slot(), "booking not confirmed"),
            Err(e) => panic!("expected a confirmed booking, got {e}"),
        }
    }
}
