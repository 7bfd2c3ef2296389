//! Mapping between table rows and domain records.
//!
//! Amounts are stored as `BIGINT` paise, guest counts as `INTEGER` and
//! statuses as their lowercase names.

use banquet_core::booking::{Booking, BookingStatus};
use banquet_core::checklist::{Checklist, Milestone, MilestoneState};
use banquet_core::error::BookingError;
use banquet_core::lead::{Lead, LeadStatus};
use banquet_core::types::{
    BookingId, BranchId, ChecklistId, ContactInfo, HallName, LeadId, Money, SalespersonId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

pub(crate) const SELECT_LEAD: &str = "SELECT id, branch_id, salesperson_id, contact_name, \
     contact_phone, contact_email, event_date, guest_count, estimated_budget_paise, notes, \
     status, created_at, updated_at FROM leads";

pub(crate) const SELECT_CHECKLIST: &str =
    "SELECT id, lead_id, branch_id, milestones, updated_at FROM checklists";

pub(crate) const SELECT_BOOKING: &str = "SELECT id, branch_id, lead_id, client_name, \
     client_phone, client_email, hall, event_date, event_time, guest_count, total_paise, \
     advance_paise, balance_paise, status, created_at, updated_at FROM bookings";

/// Name of the partial unique index guarding confirmed slots
pub(crate) const SLOT_CONSTRAINT: &str = "bookings_confirmed_slot";

/// Maps a sqlx failure to a storage error naming what was attempted
pub(crate) fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> BookingError {
    move |e| BookingError::Storage(format!("Failed to {action}: {e}"))
}

/// Maps a failed booking write, turning a slot violation into
/// [`BookingError::ConstraintViolation`].
pub(crate) fn booking_write_error(error: &sqlx::Error, booking: &Booking) -> BookingError {
    match error {
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.constraint() == Some(SLOT_CONSTRAINT) =>
        {
            tracing::debug!(slot = %booking.conflict_key(), "Slot index rejected booking");
            metrics::counter!("banquet.postgres.slot_violations").increment(1);
            BookingError::ConstraintViolation(booking.conflict_key())
        }
        _ => BookingError::Storage(format!("Failed to write booking {}: {error}", booking.id)),
    }
}

fn paise(money: Money) -> Result<i64, BookingError> {
    i64::try_from(money.paise())
        .map_err(|_| BookingError::InvalidAmount(format!("{money} is too large to store")))
}

fn money(paise: i64) -> Result<Money, BookingError> {
    u64::try_from(paise)
        .map(Money::from_paise)
        .map_err(|_| BookingError::Storage(format!("Negative amount {paise} in storage")))
}

fn guests(count: u32) -> Result<i32, BookingError> {
    i32::try_from(count)
        .map_err(|_| BookingError::Validation(format!("Guest count {count} is too large")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, BookingError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| BookingError::Storage(format!("Failed to read column {name}: {e}")))
}

fn guest_column(row: &PgRow) -> Result<u32, BookingError> {
    let count: i32 = column(row, "guest_count")?;
    u32::try_from(count)
        .map_err(|_| BookingError::Storage(format!("Negative guest count {count} in storage")))
}

// ============================================================================
// Leads
// ============================================================================

pub(crate) fn lead_from_row(row: &PgRow) -> Result<Lead, BookingError> {
    let budget: Option<i64> = column(row, "estimated_budget_paise")?;
    let status: String = column(row, "status")?;
    Ok(Lead {
        id: LeadId::from_uuid(column(row, "id")?),
        branch_id: BranchId::from_uuid(column(row, "branch_id")?),
        salesperson_id: SalespersonId::from_uuid(column(row, "salesperson_id")?),
        contact: ContactInfo {
            name: column(row, "contact_name")?,
            phone: column(row, "contact_phone")?,
            email: column(row, "contact_email")?,
        },
        event_date: column(row, "event_date")?,
        guest_count: guest_column(row)?,
        estimated_budget: budget.map(money).transpose()?,
        notes: column(row, "notes")?,
        status: status.parse::<LeadStatus>()?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) async fn insert_lead_row(conn: &mut PgConnection, lead: &Lead) -> Result<(), BookingError> {
    sqlx::query(
        r"
        INSERT INTO leads (
            id, branch_id, salesperson_id, contact_name, contact_phone, contact_email,
            event_date, guest_count, estimated_budget_paise, notes, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ",
    )
    .bind(lead.id.as_uuid())
    .bind(lead.branch_id.as_uuid())
    .bind(lead.salesperson_id.as_uuid())
    .bind(&lead.contact.name)
    .bind(&lead.contact.phone)
    .bind(lead.contact.email.as_deref())
    .bind(lead.event_date)
    .bind(guests(lead.guest_count)?)
    .bind(lead.estimated_budget.map(paise).transpose()?)
    .bind(lead.notes.as_deref())
    .bind(lead.status.as_str())
    .bind(lead.created_at)
    .bind(lead.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error("insert lead"))?;
    Ok(())
}

pub(crate) async fn update_lead_row(conn: &mut PgConnection, lead: &Lead) -> Result<(), BookingError> {
    sqlx::query(
        r"
        UPDATE leads SET
            contact_name = $2, contact_phone = $3, contact_email = $4, event_date = $5,
            guest_count = $6, estimated_budget_paise = $7, notes = $8, status = $9, updated_at = $10
        WHERE id = $1
        ",
    )
    .bind(lead.id.as_uuid())
    .bind(&lead.contact.name)
    .bind(&lead.contact.phone)
    .bind(lead.contact.email.as_deref())
    .bind(lead.event_date)
    .bind(guests(lead.guest_count)?)
    .bind(lead.estimated_budget.map(paise).transpose()?)
    .bind(lead.notes.as_deref())
    .bind(lead.status.as_str())
    .bind(lead.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error("update lead"))?;
    Ok(())
}

// ============================================================================
// Checklists
// ============================================================================

pub(crate) fn checklist_from_row(row: &PgRow) -> Result<Checklist, BookingError> {
    let Json(milestones): Json<[MilestoneState; Milestone::COUNT]> = column(row, "milestones")?;
    Ok(Checklist {
        id: ChecklistId::from_uuid(column(row, "id")?),
        lead_id: LeadId::from_uuid(column(row, "lead_id")?),
        branch_id: BranchId::from_uuid(column(row, "branch_id")?),
        milestones,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) async fn insert_checklist_row(
    conn: &mut PgConnection,
    checklist: &Checklist,
) -> Result<(), BookingError> {
    sqlx::query(
        "INSERT INTO checklists (id, lead_id, branch_id, milestones, updated_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(checklist.id.as_uuid())
    .bind(checklist.lead_id.as_uuid())
    .bind(checklist.branch_id.as_uuid())
    .bind(Json(&checklist.milestones))
    .bind(checklist.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error("insert checklist"))?;
    Ok(())
}

pub(crate) async fn update_checklist_row(
    conn: &mut PgConnection,
    checklist: &Checklist,
) -> Result<(), BookingError> {
    sqlx::query("UPDATE checklists SET milestones = $2, updated_at = $3 WHERE id = $1")
        .bind(checklist.id.as_uuid())
        .bind(Json(&checklist.milestones))
        .bind(checklist.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(db_error("update checklist"))?;
    Ok(())
}

// ============================================================================
// Bookings
// ============================================================================

pub(crate) fn booking_from_row(row: &PgRow) -> Result<Booking, BookingError> {
    let lead_id: Option<Uuid> = column(row, "lead_id")?;
    let hall: String = column(row, "hall")?;
    let status: String = column(row, "status")?;
    Ok(Booking {
        id: BookingId::from_uuid(column(row, "id")?),
        branch_id: BranchId::from_uuid(column(row, "branch_id")?),
        lead_id: lead_id.map(LeadId::from_uuid),
        client: ContactInfo {
            name: column(row, "client_name")?,
            phone: column(row, "client_phone")?,
            email: column(row, "client_email")?,
        },
        hall: HallName::new(hall)?,
        event_date: column(row, "event_date")?,
        event_time: column(row, "event_time")?,
        guest_count: guest_column(row)?,
        total_amount: money(column(row, "total_paise")?)?,
        advance_amount: money(column(row, "advance_paise")?)?,
        balance_amount: money(column(row, "balance_paise")?)?,
        status: status.parse::<BookingStatus>()?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) async fn insert_booking_row(
    conn: &mut PgConnection,
    booking: &Booking,
) -> Result<(), BookingError> {
    sqlx::query(
        r"
        INSERT INTO bookings (
            id, branch_id, lead_id, client_name, client_phone, client_email, hall, event_date,
            event_time, guest_count, total_paise, advance_paise, balance_paise, status,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ",
    )
    .bind(booking.id.as_uuid())
    .bind(booking.branch_id.as_uuid())
    .bind(booking.lead_id.map(|id| *id.as_uuid()))
    .bind(&booking.client.name)
    .bind(&booking.client.phone)
    .bind(booking.client.email.as_deref())
    .bind(booking.hall.as_str())
    .bind(booking.event_date)
    .bind(booking.event_time)
    .bind(guests(booking.guest_count)?)
    .bind(paise(booking.total_amount)?)
    .bind(paise(booking.advance_amount)?)
    .bind(paise(booking.balance_amount)?)
    .bind(booking.status.as_str())
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| booking_write_error(&e, booking))?;
    Ok(())
}

pub(crate) async fn update_booking_row(
    conn: &mut PgConnection,
    booking: &Booking,
) -> Result<(), BookingError> {
    sqlx::query(
        r"
        UPDATE bookings SET
            client_name = $2, client_phone = $3, client_email = $4, hall = $5, event_date = $6,
            event_time = $7, guest_count = $8, total_paise = $9, advance_paise = $10,
            balance_paise = $11, status = $12, updated_at = $13
        WHERE id = $1
        ",
    )
    .bind(booking.id.as_uuid())
    .bind(&booking.client.name)
    .bind(&booking.client.phone)
    .bind(booking.client.email.as_deref())
    .bind(booking.hall.as_str())
    .bind(booking.event_date)
    .bind(booking.event_time)
    .bind(guests(booking.guest_count)?)
    .bind(paise(booking.total_amount)?)
    .bind(paise(booking.advance_amount)?)
    .bind(paise(booking.balance_amount)?)
    .bind(booking.status.as_str())
    .bind(booking.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| booking_write_error(&e, booking))?;
    Ok(())
}
