use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::new_id,
    barbers,
    error::{AppError, AppResult},
    models::{ServiceRow, MINUTES_PER_DAY},
};

const SERVICE_COLUMNS: &str =
    "id, name, description, duration_minutes, price_cents, barber_id, active";

#[derive(Debug, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: i64,
    pub price_cents: i64,
    pub barber_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i64>,
    pub price_cents: Option<i64>,
    pub active: Option<bool>,
}

fn validate(name: &str, duration_minutes: i64, price_cents: i64) -> AppResult<()> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push("Service name is required.");
    }
    if !(5..=MINUTES_PER_DAY).contains(&duration_minutes) {
        errors.push("Duration must be between 5 and 1440 minutes.");
    }
    if price_cents < 0 {
        errors.push("Price cannot be negative.");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(errors.join(" ")))
    }
}

pub async fn find(conn: &mut SqliteConnection, service_id: &str) -> AppResult<Option<ServiceRow>> {
    let row = sqlx::query_as::<_, ServiceRow>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"
    ))
    .bind(service_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, service_id: &str) -> AppResult<ServiceRow> {
    let mut conn = pool.acquire().await?;
    find(&mut conn, service_id)
        .await?
        .ok_or_else(|| AppError::not_found("Service not found"))
}

/// Active services; with a barber, only those that barber offers.
pub async fn list_active(pool: &SqlitePool, barber_id: Option<&str>) -> AppResult<Vec<ServiceRow>> {
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        r#"SELECT {SERVICE_COLUMNS}
           FROM services
           WHERE active = 1 AND (? IS NULL OR barber_id IS NULL OR barber_id = ?)
           ORDER BY name"#
    ))
    .bind(barber_id)
    .bind(barber_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<ServiceRow>> {
    let rows = sqlx::query_as::<_, ServiceRow>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create(pool: &SqlitePool, input: ServiceInput) -> AppResult<ServiceRow> {
    validate(&input.name, input.duration_minutes, input.price_cents)?;

    let barber_id = input
        .barber_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    if let Some(barber_id) = barber_id.as_deref() {
        let mut conn = pool.acquire().await?;
        if barbers::find(&mut conn, barber_id).await?.is_none() {
            return Err(AppError::validation("Unknown barber for service."));
        }
    }

    let id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, name, description, duration_minutes, price_cents, barber_id, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(input.name.trim())
    .bind(input.description.trim())
    .bind(input.duration_minutes)
    .bind(input.price_cents)
    .bind(&barber_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    get(pool, &id).await
}

/// Existing appointments keep the duration and price they were booked with.
pub async fn update(pool: &SqlitePool, service_id: &str, patch: ServiceUpdate) -> AppResult<ServiceRow> {
    let mut service = get(pool, service_id).await?;
    if let Some(name) = patch.name {
        service.name = name.trim().to_string();
    }
    if let Some(description) = patch.description {
        service.description = description.trim().to_string();
    }
    if let Some(duration) = patch.duration_minutes {
        service.duration_minutes = duration;
    }
    if let Some(price) = patch.price_cents {
        service.price_cents = price;
    }
    if let Some(active) = patch.active {
        service.active = i64::from(active);
    }
    validate(&service.name, service.duration_minutes, service.price_cents)?;

    sqlx::query(
        r#"UPDATE services
           SET name = ?, description = ?, duration_minutes = ?, price_cents = ?, active = ?
           WHERE id = ?"#,
    )
    .bind(&service.name)
    .bind(&service.description)
    .bind(service.duration_minutes)
    .bind(service.price_cents)
    .bind(service.active)
    .bind(service_id)
    .execute(pool)
    .await?;

    Ok(service)
}
