//! The durable record of appointments.
//!
//! Cancelled appointments free their interval immediately; every other status
//! keeps it occupied.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::new_id,
    error::{is_unique_violation, AppError, AppResult},
    models::{
        format_date, format_minute, Appointment, AppointmentRow, AppointmentStatus, PaymentStatus,
    },
    slots::{conflicts, Interval},
};

const APPOINTMENT_COLUMNS: &str = r#"id, barber_id, client_id, service_id, date, start_minute,
       duration_minutes, price_cents, status, payment_status, notes, created_at, updated_at,
       paid_at"#;

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub barber_id: String,
    pub client_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub start_minute: i64,
    pub duration_minutes: i64,
    pub price_cents: i64,
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start_minute, self.duration_minutes)
    }
}

fn to_appointments(rows: Vec<AppointmentRow>) -> AppResult<Vec<Appointment>> {
    rows.into_iter().map(Appointment::try_from).collect()
}

/// Live appointments for the barber's day, earliest first.
pub async fn list_for_barber_on_date(
    pool: &SqlitePool,
    barber_id: &str,
    date: NaiveDate,
) -> AppResult<Vec<Appointment>> {
    let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"SELECT {APPOINTMENT_COLUMNS}
           FROM appointments
           WHERE barber_id = ? AND date = ? AND status <> ?
           ORDER BY start_minute"#
    ))
    .bind(barber_id)
    .bind(format_date(date))
    .bind(AppointmentStatus::Cancelled.as_str())
    .fetch_all(pool)
    .await?;
    to_appointments(rows)
}

pub async fn booked_intervals(
    conn: &mut SqliteConnection,
    barber_id: &str,
    date: NaiveDate,
) -> AppResult<Vec<Interval>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        r#"SELECT start_minute, duration_minutes
           FROM appointments
           WHERE barber_id = ? AND date = ? AND status <> ?
           ORDER BY start_minute"#,
    )
    .bind(barber_id)
    .bind(format_date(date))
    .bind(AppointmentStatus::Cancelled.as_str())
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(start, duration)| Interval::new(start, duration))
        .collect())
}

pub async fn get(pool: &SqlitePool, id: &str) -> AppResult<Appointment> {
    let row = sqlx::query_as::<_, AppointmentRow>(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Appointment not found"))?;
    Appointment::try_from(row)
}

pub async fn list_for_client(pool: &SqlitePool, client_id: &str) -> AppResult<Vec<Appointment>> {
    let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"SELECT {APPOINTMENT_COLUMNS}
           FROM appointments
           WHERE client_id = ?
           ORDER BY date DESC, start_minute DESC"#
    ))
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    to_appointments(rows)
}

/// Live appointments from `from` onwards, soonest first.
pub async fn list_upcoming_for_barber(
    pool: &SqlitePool,
    barber_id: &str,
    from: NaiveDate,
) -> AppResult<Vec<Appointment>> {
    let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"SELECT {APPOINTMENT_COLUMNS}
           FROM appointments
           WHERE barber_id = ? AND date >= ? AND status <> ?
           ORDER BY date, start_minute"#
    ))
    .bind(barber_id)
    .bind(format_date(from))
    .bind(AppointmentStatus::Cancelled.as_str())
    .fetch_all(pool)
    .await?;
    to_appointments(rows)
}

pub async fn list_recent(
    pool: &SqlitePool,
    status: Option<AppointmentStatus>,
    limit: i64,
) -> AppResult<Vec<Appointment>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, AppointmentRow>(&format!(
                r#"SELECT {APPOINTMENT_COLUMNS}
                   FROM appointments
                   WHERE status = ?
                   ORDER BY date DESC, start_minute DESC
                   LIMIT ?"#
            ))
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, AppointmentRow>(&format!(
                r#"SELECT {APPOINTMENT_COLUMNS}
                   FROM appointments
                   ORDER BY date DESC, start_minute DESC
                   LIMIT ?"#
            ))
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    to_appointments(rows)
}

/// Checks the candidate against the barber's live appointments and inserts
/// it as PENDING/UNPAID. Must run inside a write transaction so the check and
/// the insert see the same ledger.
pub async fn create(conn: &mut SqliteConnection, candidate: NewAppointment) -> AppResult<Appointment> {
    let booked = booked_intervals(conn, &candidate.barber_id, candidate.date).await?;
    if conflicts(&booked, &candidate.interval()) {
        return Err(slot_taken(&candidate));
    }

    let id = new_id();
    let now = Utc::now().to_rfc3339();
    let inserted = sqlx::query(
        r#"INSERT INTO appointments
           (id, barber_id, client_id, service_id, date, start_minute, duration_minutes,
            price_cents, status, payment_status, notes, created_at, updated_at, paid_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
    )
    .bind(&id)
    .bind(&candidate.barber_id)
    .bind(&candidate.client_id)
    .bind(&candidate.service_id)
    .bind(format_date(candidate.date))
    .bind(candidate.start_minute)
    .bind(candidate.duration_minutes)
    .bind(candidate.price_cents)
    .bind(AppointmentStatus::Pending.as_str())
    .bind(PaymentStatus::Unpaid.as_str())
    .bind(&candidate.notes)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(slot_taken(&candidate)),
        Err(err) => return Err(err.into()),
    }

    Ok(Appointment {
        id,
        barber_id: candidate.barber_id,
        client_id: candidate.client_id,
        service_id: candidate.service_id,
        date: candidate.date,
        time: candidate.start_minute,
        duration_minutes: candidate.duration_minutes,
        price_cents: candidate.price_cents,
        status: AppointmentStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        notes: candidate.notes,
        created_at: now.clone(),
        updated_at: now,
        paid_at: None,
    })
}

fn slot_taken(candidate: &NewAppointment) -> AppError {
    AppError::Conflict(format!(
        "The {} slot on {} is no longer available.",
        format_minute(candidate.start_minute),
        format_date(candidate.date)
    ))
}

/// Compare-and-set status change: only applies while the appointment is still
/// in `from`. A concurrent change makes this fail with `InvalidTransition`.
pub async fn update_status(
    pool: &SqlitePool,
    id: &str,
    from: (AppointmentStatus, PaymentStatus),
    to: (AppointmentStatus, PaymentStatus),
) -> AppResult<Appointment> {
    let now = Utc::now().to_rfc3339();
    let becomes_paid = from.1 == PaymentStatus::Unpaid && to.1 == PaymentStatus::Paid;

    let result = sqlx::query(
        r#"UPDATE appointments
           SET status = ?, payment_status = ?, updated_at = ?,
               paid_at = CASE WHEN ? THEN ? ELSE paid_at END
           WHERE id = ? AND status = ? AND payment_status = ?"#,
    )
    .bind(to.0.as_str())
    .bind(to.1.as_str())
    .bind(&now)
    .bind(becomes_paid)
    .bind(&now)
    .bind(id)
    .bind(from.0.as_str())
    .bind(from.1.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let current = get(pool, id).await?;
        return Err(AppError::InvalidTransition(format!(
            "Appointment is {} / {}, expected {} / {}.",
            current.status.as_str(),
            current.payment_status.as_str(),
            from.0.as_str(),
            from.1.as_str()
        )));
    }

    get(pool, id).await
}
