//! Banquet Booking Demo
//!
//! Walks through the main booking flows against a live core:
//! - Direct bookings, a double-booking rejection and an overbooked day
//! - A lead moving through the funnel and converting on its advance payment
//! - Cancellation releasing a slot
//! - Branch-scoped change notifications
//!
//! # Usage
//!
//! ```bash
//! # In-memory (default)
//! cargo run --bin banquet-demo
//!
//! # Against Postgres
//! BANQUET_STORAGE=postgres DATABASE_URL=postgres://... \
//!     cargo run --bin banquet-demo --features postgres
//! ```

use banquet_core::checklist::{ConversionTerms, Milestone, MilestoneUpdate};
use banquet_core::environment::SystemClock;
use banquet_core::error::BookingError;
use banquet_core::repository::BanquetRepository;
use banquet_core::types::parse_event_time;
use banquet_core::{
    BookingRequest, BookingStatus, BranchId, ContactInfo, HallName, LeadStatus, Money, NewLead,
    SalespersonId,
};
use banquet_runtime::{
    BanquetCore, BanquetEnvironment, BroadcastNotifier, Config, ConfigError, InMemoryRepository,
    StorageBackend,
};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Errors that end the demo
#[derive(Error, Debug)]
enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Booking error: {0}")]
    Booking(#[from] BookingError),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] banquet_postgres::PostgresError),

    #[error("{0}")]
    Setup(String),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| "info,banquet_runtime=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(storage = ?config.storage, "Configuration loaded");

    let repository = repository(&config).await?;
    let env = BanquetEnvironment::new(
        repository,
        Arc::new(BroadcastNotifier::new(config.notify_capacity)),
        Arc::new(SystemClock),
    );
    let core = BanquetCore::new(env);

    println!("\n🏛️  ============================================");
    println!("   Banquet Booking Core - Live Demo");
    println!("============================================\n");

    let branch = BranchId::new();
    let mut observer = core.subscribe(branch);

    direct_bookings(&core, branch).await?;
    lead_conversion(&core, branch).await?;

    println!("\n📡 Notifications seen by the branch observer:");
    core.unsubscribe(observer.id());
    while let Some(item) = observer.recv().await {
        match item {
            Ok(notification) => println!(
                "   #{:<3} {}",
                notification.sequence,
                notification.event.event_type()
            ),
            Err(e) => println!("   ⚠️  {e}"),
        }
    }

    let funnel = core.funnel(branch).await?;
    println!(
        "\n📊 Funnel: {} lead(s), conversion rate {:.1}%",
        funnel.total, funnel.conversion_rate
    );
    println!("\n✓ Demo complete\n");
    Ok(())
}

async fn repository(config: &Config) -> Result<Arc<dyn BanquetRepository>, AppError> {
    match config.storage {
        StorageBackend::Memory => Ok(Arc::new(InMemoryRepository::new())),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            let repository = banquet_postgres::PostgresRepository::connect(
                &config.postgres.url,
                config.postgres.max_connections,
            )
            .await?;
            repository.migrate().await?;
            Ok(Arc::new(repository))
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => Err(AppError::Setup(
            "BANQUET_STORAGE=postgres needs the 'postgres' feature".to_string(),
        )),
    }
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| AppError::Setup(format!("invalid date {year}-{month}-{day}")))
}

async fn direct_bookings(core: &BanquetCore, branch: BranchId) -> Result<(), AppError> {
    println!("1️⃣  Direct bookings for the Grand Ballroom on 2025-03-10");

    let hall = HallName::new("Grand Ballroom")?;
    let request = |time: &str, client: &str| -> Result<BookingRequest, AppError> {
        Ok(BookingRequest {
            branch_id: branch,
            hall: hall.clone(),
            event_date: date(2025, 3, 10)?,
            event_time: parse_event_time(time)?,
            guest_count: 200,
            total_amount: Money::from_rupees(500_000),
            advance_amount: Money::from_rupees(100_000),
            client: ContactInfo::new(client, "9800000000"),
        })
    };

    let evening = core.create_booking(request("18:00", "Asha Rao")?).await?;
    println!(
        "   ✓ Booking A confirmed, balance {}",
        evening.balance_amount
    );

    match core.create_booking(request("18:00", "Vikram Shah")?).await {
        Err(BookingError::DoubleBooking(conflict)) => {
            println!("   ✗ Booking B rejected: {conflict}");
        }
        Err(e) => return Err(e.into()),
        Ok(_) => return Err(AppError::Setup("booking B should have collided".to_string())),
    }

    core.create_booking(request("12:00", "Meera Iyer")?).await?;
    let level = core.classify(branch, &hall, date(2025, 3, 10)?).await?;
    println!("   ✓ Booking C at 12:00 confirmed; the day is now {level}");

    core.update_booking_status(evening.id, BookingStatus::Cancelled)
        .await?;
    core.create_booking(request("18:00", "Vikram Shah")?).await?;
    println!("   ✓ Booking A cancelled; the 18:00 slot was rebooked\n");
    Ok(())
}

async fn lead_conversion(core: &BanquetCore, branch: BranchId) -> Result<(), AppError> {
    println!("2️⃣  Lead conversion");

    let lead = core
        .create_lead(NewLead {
            branch_id: branch,
            salesperson_id: SalespersonId::new(),
            contact: ContactInfo::new("Ravi Menon", "9811111111").with_email("ravi@example.com"),
            event_date: date(2025, 5, 2)?,
            guest_count: 150,
            estimated_budget: Some(Money::from_rupees(250_000)),
            notes: None,
        })
        .await?;
    core.update_lead_status(lead.id, LeadStatus::Negotiation)
        .await?;
    println!("   ✓ Lead captured and moved to negotiation");

    let checklist = core.checklist_for_lead(lead.id).await?;
    let now = chrono::Utc::now();
    for milestone in [Milestone::Call, Milestone::PropertyVisit, Milestone::FoodTasting] {
        core.complete_milestone(checklist.id, MilestoneUpdate::complete(milestone, now))
            .await?;
    }

    let terms = ConversionTerms::new(
        HallName::new("Lotus Hall")?,
        parse_event_time("19:30")?,
        Money::from_rupees(200_000),
    );
    let advance = MilestoneUpdate::complete(Milestone::AdvancePayment, now)
        .with_amount(Money::from_rupees(50_000))
        .with_terms(terms);

    let outcome = core.complete_milestone(checklist.id, advance.clone()).await?;
    if let Some(booking) = &outcome.booking {
        println!(
            "   ✓ Advance received: booking {} for {} (total incl. GST {})",
            booking.id, booking.hall, booking.total_amount
        );
    }

    let repeat = core.complete_milestone(checklist.id, advance).await?;
    println!(
        "   ✓ Repeating the advance payment changed nothing: {}",
        !repeat.changed && repeat.booking.is_none()
    );
    println!(
        "   ✓ Checklist progress {:.0}%",
        repeat.checklist.progress_percent()
    );
    Ok(())
}
