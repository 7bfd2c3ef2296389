//! `PostgreSQL` repository for the banquet booking core.
//!
//! Implements [`BanquetRepository`] on sqlx with:
//!
//! - Row locks (`SELECT ... FOR UPDATE`) around every read-modify-write
//! - One transaction per lead conversion covering the lead, its checklist
//!   and the new booking
//! - A partial unique index on `(branch_id, hall, event_date, event_time)`
//!   for confirmed bookings, so two writers can never both confirm a slot
//!
//! A slot rejected by the index is reported as
//! [`BookingError::ConstraintViolation`]; the runtime turns it into a
//! [`BookingError::DoubleBooking`] naming the holder.
//!
//! # Example
//!
//! ```no_run
//! use banquet_postgres::PostgresRepository;
//!
//! # async fn example() -> Result<(), banquet_postgres::PostgresError> {
//! let repository = PostgresRepository::connect("postgres://localhost/banquet", 10).await?;
//! repository.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use banquet_core::booking::{Booking, Conflict};
use banquet_core::checklist::Checklist;
use banquet_core::error::{BookingError, Entity};
use banquet_core::lead::{Lead, LeadStatus};
use banquet_core::repository::{
    BanquetRepository, BookingMutation, ChecklistMutation, ConversionOutcome, ConversionPlan,
    LeadMutation, RepoFuture, Updated,
};
use banquet_core::types::{BookingId, BranchId, ChecklistId, ConflictKey, HallName, LeadId};
use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use rows::{
    SELECT_BOOKING, SELECT_CHECKLIST, SELECT_LEAD, booking_from_row, checklist_from_row, db_error,
    insert_booking_row, insert_checklist_row, insert_lead_row, lead_from_row, update_booking_row,
    update_checklist_row, update_lead_row,
};

/// Errors raised while setting up the Postgres backend
#[derive(Error, Debug)]
pub enum PostgresError {
    /// Could not connect to the database
    #[error("Failed to connect to Postgres: {0}")]
    Connect(#[from] sqlx::Error),

    /// Applying the schema migrations failed
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// [`BanquetRepository`] backed by a `PostgreSQL` connection pool.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool of up to `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::Connect`] if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        tracing::info!(max_connections, "Connected to Postgres");
        Ok(Self::from_pool(pool))
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresError::Migrate`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), PostgresError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Postgres schema up to date");
        Ok(())
    }

    async fn fetch_booking(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        sqlx::query(&format!("{SELECT_BOOKING} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("load booking"))?
            .as_ref()
            .map(booking_from_row)
            .transpose()
    }
}

impl BanquetRepository for PostgresRepository {
    fn insert_lead(&self, lead: Lead, checklist: Checklist) -> RepoFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
            insert_lead_row(&mut tx, &lead).await?;
            insert_checklist_row(&mut tx, &checklist).await?;
            tx.commit().await.map_err(db_error("commit lead"))?;
            Ok(())
        })
    }

    fn lead(&self, id: LeadId) -> RepoFuture<'_, Lead> {
        Box::pin(async move {
            let row = sqlx::query(&format!("{SELECT_LEAD} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load lead"))?
                .ok_or_else(|| BookingError::not_found(Entity::Lead, id))?;
            lead_from_row(&row)
        })
    }

    fn leads_for_branch(&self, branch_id: BranchId) -> RepoFuture<'_, Vec<Lead>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "{SELECT_LEAD} WHERE branch_id = $1 ORDER BY created_at, id"
            ))
            .bind(branch_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list leads"))?;
            rows.iter().map(lead_from_row).collect()
        })
    }

    fn update_lead(&self, id: LeadId, mutation: LeadMutation) -> RepoFuture<'_, Updated<Lead>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
            let row = sqlx::query(&format!("{SELECT_LEAD} WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock lead"))?
                .ok_or_else(|| BookingError::not_found(Entity::Lead, id))?;
            let before = lead_from_row(&row)?;

            let mut after = before.clone();
            mutation(&mut after)?;
            update_lead_row(&mut tx, &after).await?;
            tx.commit().await.map_err(db_error("commit lead"))?;
            Ok(Updated { before, after })
        })
    }

    fn checklist(&self, id: ChecklistId) -> RepoFuture<'_, Checklist> {
        Box::pin(async move {
            let row = sqlx::query(&format!("{SELECT_CHECKLIST} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load checklist"))?
                .ok_or_else(|| BookingError::not_found(Entity::Checklist, id))?;
            checklist_from_row(&row)
        })
    }

    fn checklist_for_lead(&self, lead_id: LeadId) -> RepoFuture<'_, Checklist> {
        Box::pin(async move {
            let row = sqlx::query(&format!("{SELECT_CHECKLIST} WHERE lead_id = $1"))
                .bind(lead_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load checklist"))?
                .ok_or_else(|| BookingError::not_found(Entity::Checklist, lead_id))?;
            checklist_from_row(&row)
        })
    }

    fn update_checklist(
        &self,
        id: ChecklistId,
        mutation: ChecklistMutation,
    ) -> RepoFuture<'_, (Checklist, bool)> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
            let row = sqlx::query(&format!("{SELECT_CHECKLIST} WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock checklist"))?
                .ok_or_else(|| BookingError::not_found(Entity::Checklist, id))?;
            let mut checklist = checklist_from_row(&row)?;

            let changed = mutation(&mut checklist)?;
            if changed {
                update_checklist_row(&mut tx, &checklist).await?;
                tx.commit().await.map_err(db_error("commit checklist"))?;
            }
            Ok((checklist, changed))
        })
    }

    fn convert_lead(
        &self,
        lead_id: LeadId,
        plan: ConversionPlan,
    ) -> RepoFuture<'_, ConversionOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

            let lead_row = sqlx::query(&format!("{SELECT_LEAD} WHERE id = $1 FOR UPDATE"))
                .bind(lead_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock lead"))?
                .ok_or_else(|| BookingError::not_found(Entity::Lead, lead_id))?;
            let mut lead = lead_from_row(&lead_row)?;

            let checklist_row =
                sqlx::query(&format!("{SELECT_CHECKLIST} WHERE lead_id = $1 FOR UPDATE"))
                    .bind(lead_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error("lock checklist"))?
                    .ok_or_else(|| BookingError::not_found(Entity::Checklist, lead_id))?;
            let mut checklist = checklist_from_row(&checklist_row)?;

            let booking = plan(&mut lead, &mut checklist)?;
            let Some(new_booking) = &booking else {
                // Already converted; nothing to write
                return Ok(ConversionOutcome {
                    lead,
                    checklist,
                    booking,
                });
            };

            insert_booking_row(&mut tx, new_booking).await?;
            update_lead_row(&mut tx, &lead).await?;
            update_checklist_row(&mut tx, &checklist).await?;
            tx.commit().await.map_err(db_error("commit conversion"))?;

            tracing::debug!(lead_id = %lead_id, booking_id = %new_booking.id, "Conversion committed");
            Ok(ConversionOutcome {
                lead,
                checklist,
                booking,
            })
        })
    }

    fn insert_booking(&self, booking: Booking) -> RepoFuture<'_, Booking> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(db_error("acquire connection"))?;
            insert_booking_row(&mut conn, &booking).await?;
            Ok(booking)
        })
    }

    fn booking(&self, id: BookingId) -> RepoFuture<'_, Booking> {
        Box::pin(async move {
            self.fetch_booking(id)
                .await?
                .ok_or_else(|| BookingError::not_found(Entity::Booking, id))
        })
    }

    fn update_booking(
        &self,
        id: BookingId,
        mutation: BookingMutation,
    ) -> RepoFuture<'_, Updated<Booking>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
            let row = sqlx::query(&format!("{SELECT_BOOKING} WHERE id = $1 FOR UPDATE"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock booking"))?
                .ok_or_else(|| BookingError::not_found(Entity::Booking, id))?;
            let before = booking_from_row(&row)?;

            let mut after = before.clone();
            mutation(&mut after)?;
            update_booking_row(&mut tx, &after).await?;
            tx.commit().await.map_err(db_error("commit booking"))?;
            Ok(Updated { before, after })
        })
    }

    fn find_conflict(&self, key: ConflictKey) -> RepoFuture<'_, Option<Conflict>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "{SELECT_BOOKING} WHERE branch_id = $1 AND hall = $2 AND event_date = $3 \
                 AND event_time = $4 AND status = 'confirmed'"
            ))
            .bind(key.branch_id.as_uuid())
            .bind(key.hall.as_str())
            .bind(key.date)
            .bind(key.time)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("look up slot"))?;
            Ok(row
                .as_ref()
                .map(booking_from_row)
                .transpose()?
                .as_ref()
                .map(Conflict::with))
        })
    }

    fn confirmed_bookings(
        &self,
        branch_id: BranchId,
        hall: Option<HallName>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "{SELECT_BOOKING} WHERE branch_id = $1 AND status = 'confirmed' \
                 AND ($2::text IS NULL OR hall = $2) AND event_date BETWEEN $3 AND $4 \
                 ORDER BY event_date, event_time, hall, created_at"
            ))
            .bind(branch_id.as_uuid())
            .bind(hall.as_ref().map(HallName::as_str))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list confirmed bookings"))?;
            rows.iter().map(booking_from_row).collect()
        })
    }

    fn bookings_for_branch(
        &self,
        branch_id: BranchId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepoFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "{SELECT_BOOKING} WHERE branch_id = $1 AND event_date BETWEEN $2 AND $3 \
                 ORDER BY event_date, event_time, hall, created_at"
            ))
            .bind(branch_id.as_uuid())
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list bookings"))?;
            rows.iter().map(booking_from_row).collect()
        })
    }

    fn lead_status_counts(&self, branch_id: BranchId) -> RepoFuture<'_, Vec<(LeadStatus, u64)>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM leads WHERE branch_id = $1 GROUP BY status",
            )
            .bind(branch_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("count leads"))?;

            rows.into_iter()
                .map(|(status, count)| {
                    let count = u64::try_from(count).map_err(|_| {
                        BookingError::Storage(format!("Negative lead count {count}"))
                    })?;
                    Ok((status.parse::<LeadStatus>()?, count))
                })
                .collect()
        })
    }
}
