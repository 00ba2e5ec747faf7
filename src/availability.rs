//! Recurring weekly hours per barber plus date-specific overrides.
//!
//! A barber has at most one rule per weekday (the table's primary key), and an
//! override for a date replaces that day's rule entirely.

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    barbers,
    error::{AppError, AppResult},
    models::{
        format_date, parse_minute, weekday_from_index, weekday_index, AvailabilityOverride,
        AvailabilityRule, AvailabilityRuleRow, OverrideRow, Role, Window,
    },
    settings::ShopSettings,
};

#[derive(Debug, Clone, Deserialize)]
pub struct HoursInput {
    pub is_available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl HoursInput {
    pub fn open(start: &str, end: &str) -> Self {
        Self {
            is_available: true,
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            reason: None,
        }
    }

    pub fn closed() -> Self {
        Self {
            is_available: false,
            start_time: None,
            end_time: None,
            reason: None,
        }
    }

    /// Open days need a valid window; closed days may omit their hours.
    fn window(&self) -> AppResult<Option<Window>> {
        match (self.start_time.as_deref(), self.end_time.as_deref()) {
            (Some(start), Some(end)) => {
                Window::new(parse_minute(start)?, parse_minute(end)?).map(Some)
            }
            (None, None) if !self.is_available => Ok(None),
            _ => Err(AppError::validation("Both start_time and end_time are required.")),
        }
    }
}

async fn require_barber(conn: &mut SqliteConnection, barber_id: &str) -> AppResult<()> {
    barbers::find(conn, barber_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Barber not found"))
}

/// One rule per configured weekday, Monday first.
pub async fn get_rules(pool: &SqlitePool, barber_id: &str) -> AppResult<Vec<AvailabilityRule>> {
    let mut conn = pool.acquire().await?;
    require_barber(&mut conn, barber_id).await?;

    let rows = sqlx::query_as::<_, AvailabilityRuleRow>(
        r#"SELECT barber_id, day_of_week, start_minute, end_minute, is_available
           FROM availability_rules
           WHERE barber_id = ?
           ORDER BY day_of_week"#,
    )
    .bind(barber_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(AvailabilityRule::try_from).collect()
}

/// Replaces whatever rule the barber had for `day`.
pub async fn upsert_rule(
    pool: &SqlitePool,
    barber_id: &str,
    day: Weekday,
    input: HoursInput,
) -> AppResult<AvailabilityRule> {
    let window = input.window()?;
    let mut conn = pool.acquire().await?;
    require_barber(&mut conn, barber_id).await?;

    let (start, end) = window.map_or((0, 0), |w| (w.start_minute, w.end_minute));
    sqlx::query(
        r#"INSERT INTO availability_rules
           (barber_id, day_of_week, start_minute, end_minute, is_available, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(barber_id, day_of_week) DO UPDATE SET
             start_minute = excluded.start_minute,
             end_minute = excluded.end_minute,
             is_available = excluded.is_available,
             updated_at = excluded.updated_at"#,
    )
    .bind(barber_id)
    .bind(weekday_index(day))
    .bind(start)
    .bind(end)
    .bind(i64::from(input.is_available))
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(AvailabilityRule {
        barber_id: barber_id.to_string(),
        day_of_week: day,
        start_time: start,
        end_time: end,
        is_available: input.is_available,
    })
}

pub async fn list_overrides(
    pool: &SqlitePool,
    barber_id: &str,
    from: NaiveDate,
) -> AppResult<Vec<AvailabilityOverride>> {
    let mut conn = pool.acquire().await?;
    require_barber(&mut conn, barber_id).await?;

    let rows = sqlx::query_as::<_, OverrideRow>(
        r#"SELECT barber_id, date, is_available, start_minute, end_minute, reason
           FROM availability_overrides
           WHERE barber_id = ? AND date >= ?
           ORDER BY date"#,
    )
    .bind(barber_id)
    .bind(format_date(from))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(AvailabilityOverride::try_from).collect()
}

pub async fn upsert_override(
    pool: &SqlitePool,
    barber_id: &str,
    date: NaiveDate,
    input: HoursInput,
) -> AppResult<AvailabilityOverride> {
    let window = if input.is_available { input.window()? } else { None };
    let mut conn = pool.acquire().await?;
    require_barber(&mut conn, barber_id).await?;

    let reason = input
        .reason
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    sqlx::query(
        r#"INSERT INTO availability_overrides
           (barber_id, date, is_available, start_minute, end_minute, reason, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(barber_id, date) DO UPDATE SET
             is_available = excluded.is_available,
             start_minute = excluded.start_minute,
             end_minute = excluded.end_minute,
             reason = excluded.reason,
             updated_at = excluded.updated_at"#,
    )
    .bind(barber_id)
    .bind(format_date(date))
    .bind(i64::from(input.is_available))
    .bind(window.map(|w| w.start_minute))
    .bind(window.map(|w| w.end_minute))
    .bind(&reason)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(AvailabilityOverride {
        barber_id: barber_id.to_string(),
        date,
        is_available: input.is_available,
        start_time: window.map(|w| w.start_minute),
        end_time: window.map(|w| w.end_minute),
        reason,
    })
}

pub async fn delete_override(pool: &SqlitePool, barber_id: &str, date: NaiveDate) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM availability_overrides WHERE barber_id = ? AND date = ?")
        .bind(barber_id)
        .bind(format_date(date))
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("No override for that date"));
    }
    Ok(())
}

/// The window that applies on `date`: the override if one exists, otherwise
/// the weekday rule. `None` means closed.
pub async fn effective_window(
    conn: &mut SqliteConnection,
    barber_id: &str,
    date: NaiveDate,
) -> AppResult<Option<Window>> {
    let override_row = sqlx::query_as::<_, OverrideRow>(
        r#"SELECT barber_id, date, is_available, start_minute, end_minute, reason
           FROM availability_overrides
           WHERE barber_id = ? AND date = ?"#,
    )
    .bind(barber_id)
    .bind(format_date(date))
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = override_row {
        return Ok(AvailabilityOverride::try_from(row)?.window());
    }

    let rule = sqlx::query_as::<_, AvailabilityRuleRow>(
        r#"SELECT barber_id, day_of_week, start_minute, end_minute, is_available
           FROM availability_rules
           WHERE barber_id = ? AND day_of_week = ?"#,
    )
    .bind(barber_id)
    .bind(weekday_index(date.weekday()))
    .fetch_optional(&mut *conn)
    .await?;

    match rule {
        Some(row) => Ok(AvailabilityRule::try_from(row)?.window()),
        None => Ok(None),
    }
}

/// Adds the shop's default hours for every (barber, weekday) without a rule.
/// Existing rules are never touched. Returns the number of rules added.
pub async fn backfill_defaults(pool: &SqlitePool, settings: &ShopSettings) -> AppResult<u64> {
    let barber_ids = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE role = ?")
        .bind(Role::Barber.as_str())
        .fetch_all(pool)
        .await?;

    let now = Utc::now().to_rfc3339();
    let mut added = 0;
    for barber_id in &barber_ids {
        for index in 0..7 {
            let day = weekday_from_index(index)?;
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO availability_rules
                   (barber_id, day_of_week, start_minute, end_minute, is_available, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(barber_id)
            .bind(index)
            .bind(settings.default_open_minute)
            .bind(settings.default_close_minute)
            .bind(i64::from(settings.open_by_default(day)))
            .bind(&now)
            .execute(pool)
            .await?;
            added += result.rows_affected();
        }
    }

    log::info!(
        "Backfilled {added} availability rules across {} barbers",
        barber_ids.len()
    );
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_test_user, test_pool};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    #[actix_web::test]
    async fn upsert_replaces_the_days_rule() {
        let pool = test_pool().await;
        let barber = insert_test_user(&pool, "sam", Role::Barber).await;

        upsert_rule(&pool, &barber, Weekday::Mon, HoursInput::open("09:00", "18:00"))
            .await
            .unwrap();
        upsert_rule(&pool, &barber, Weekday::Mon, HoursInput::open("10:00", "16:00"))
            .await
            .unwrap();
        upsert_rule(&pool, &barber, Weekday::Sun, HoursInput::closed())
            .await
            .unwrap();

        let rules = get_rules(&pool, &barber).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].day_of_week, Weekday::Mon);
        assert_eq!(rules[0].start_time, 600);
        assert_eq!(rules[0].end_time, 960);
        assert_eq!(rules[1].day_of_week, Weekday::Sun);
        assert!(!rules[1].is_available);
    }

    #[actix_web::test]
    async fn rejects_unknown_barbers_and_bad_windows() {
        let pool = test_pool().await;
        let err = get_rules(&pool, "nobody").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let client = insert_test_user(&pool, "cli", Role::Client).await;
        let err = upsert_rule(&pool, &client, Weekday::Mon, HoursInput::open("09:00", "18:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let barber = insert_test_user(&pool, "sam", Role::Barber).await;
        let err = upsert_rule(&pool, &barber, Weekday::Mon, HoursInput::open("18:00", "09:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let half_open = HoursInput {
            end_time: None,
            ..HoursInput::open("09:00", "18:00")
        };
        let err = upsert_rule(&pool, &barber, Weekday::Mon, half_open)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[actix_web::test]
    async fn override_takes_precedence_over_weekly_rule() {
        let pool = test_pool().await;
        let barber = insert_test_user(&pool, "sam", Role::Barber).await;
        upsert_rule(&pool, &barber, Weekday::Mon, HoursInput::open("09:00", "18:00"))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let window = effective_window(&mut conn, &barber, monday()).await.unwrap();
        assert_eq!(window, Some(Window::new(540, 1080).unwrap()));
        drop(conn);

        upsert_override(
            &pool,
            &barber,
            monday(),
            HoursInput {
                reason: Some("Holiday".into()),
                ..HoursInput::closed()
            },
        )
        .await
        .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(effective_window(&mut conn, &barber, monday()).await.unwrap(), None);
        drop(conn);

        upsert_override(&pool, &barber, monday(), HoursInput::open("12:00", "14:00"))
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            effective_window(&mut conn, &barber, monday()).await.unwrap(),
            Some(Window::new(720, 840).unwrap())
        );
        drop(conn);

        let listed = list_overrides(&pool, &barber, monday()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].reason, None);

        delete_override(&pool, &barber, monday()).await.unwrap();
        let err = delete_override(&pool, &barber, monday()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn missing_rule_means_closed() {
        let pool = test_pool().await;
        let barber = insert_test_user(&pool, "sam", Role::Barber).await;
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(effective_window(&mut conn, &barber, monday()).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn backfill_only_adds_missing_days() {
        let pool = test_pool().await;
        let barber = insert_test_user(&pool, "sam", Role::Barber).await;
        upsert_rule(&pool, &barber, Weekday::Mon, HoursInput::open("12:00", "20:00"))
            .await
            .unwrap();

        let settings = ShopSettings::default();
        assert_eq!(backfill_defaults(&pool, &settings).await.unwrap(), 6);
        assert_eq!(backfill_defaults(&pool, &settings).await.unwrap(), 0);

        let rules = get_rules(&pool, &barber).await.unwrap();
        assert_eq!(rules.len(), 7);
        assert_eq!(rules[0].start_time, 720);
        assert!(rules[1].is_available);
        assert_eq!(rules[1].start_time, 540);
        assert!(!rules[6].is_available);
    }
}
