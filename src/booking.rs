//! The booking write path.
//!
//! Everything the client saw when listing slots may be stale by the time it
//! books, so the whole check (barber, service, availability, ledger overlap)
//! runs again inside one `BEGIN IMMEDIATE` transaction. SQLite admits a single
//! writer at a time, so two racing bookers are serialised and the loser sees
//! the winner's row and gets `Conflict`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    availability, barbers,
    error::{AppError, AppResult},
    ledger::{self, NewAppointment},
    models::Appointment,
    services,
    settings::ShopSettings,
    slots::{candidate_starts, step_for},
};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub barber_id: String,
    pub client_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub start_minute: i64,
    pub notes: Option<String>,
}

/// Books the requested slot or fails with `Validation` (terminal) or
/// `Conflict` (slot taken; re-list slots and let the user pick again).
pub async fn book(
    pool: &SqlitePool,
    settings: &ShopSettings,
    request: BookingRequest,
    now: NaiveDateTime,
) -> AppResult<Appointment> {
    validate_timing(settings, &request, now)?;

    // Dropping `tx` before commit (cancelled request) rolls it back.
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    let outcome = commit_checked(&mut *tx, settings, request).await;
    match &outcome {
        Ok(_) => tx.commit().await?,
        Err(_) => {
            if let Err(err) = tx.rollback().await {
                log::warn!("Rollback after failed booking failed: {err}");
            }
        }
    }

    match &outcome {
        Ok(appointment) => log::info!(
            "Booked appointment {} with barber {} on {} at minute {}",
            appointment.id,
            appointment.barber_id,
            appointment.date,
            appointment.time
        ),
        Err(err) if err.is_conflict() => log::warn!("Booking conflict: {err}"),
        Err(_) => {}
    }
    outcome
}

fn validate_timing(
    settings: &ShopSettings,
    request: &BookingRequest,
    now: NaiveDateTime,
) -> AppResult<()> {
    let start = NaiveTime::from_num_seconds_from_midnight_opt((request.start_minute * 60) as u32, 0)
        .filter(|_| request.start_minute >= 0)
        .ok_or_else(|| AppError::validation("Start time must fall within the day."))?;

    if request.date.and_time(start) < now {
        return Err(AppError::validation("Cannot book an appointment in the past."));
    }
    if request.date > now.date() + settings.horizon() {
        return Err(AppError::validation(format!(
            "Bookings open at most {} days ahead.",
            settings.booking_horizon_days
        )));
    }
    Ok(())
}

async fn commit_checked(
    conn: &mut SqliteConnection,
    settings: &ShopSettings,
    request: BookingRequest,
) -> AppResult<Appointment> {
    let barber = barbers::find(conn, &request.barber_id)
        .await?
        .filter(|barber| barber.active != 0)
        .ok_or_else(|| AppError::validation("Unknown or inactive barber."))?;

    let service = services::find(conn, &request.service_id)
        .await?
        .filter(|service| service.is_active() && service.offered_by(&barber.id))
        .ok_or_else(|| AppError::validation("Unknown service, or not offered by this barber."))?;

    let window = availability::effective_window(conn, &barber.id, request.date)
        .await?
        .ok_or_else(|| AppError::validation("The barber is not working that day."))?;

    let step = step_for(settings, service.duration_minutes);
    let on_grid = candidate_starts(window, service.duration_minutes, step)
        .any(|start| start == request.start_minute);
    if !on_grid {
        return Err(AppError::validation(
            "Requested time is outside the barber's availability.",
        ));
    }

    let notes = request
        .notes
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    ledger::create(
        conn,
        NewAppointment {
            barber_id: barber.id,
            client_id: request.client_id,
            service_id: service.id,
            date: request.date,
            start_minute: request.start_minute,
            duration_minutes: service.duration_minutes,
            price_cents: service.price_cents,
            notes,
        },
    )
    .await
}
