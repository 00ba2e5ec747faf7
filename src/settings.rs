//! Shop-wide settings, stored as a single row that is created with defaults
//! the first time anything reads it.

use chrono::{Duration, FixedOffset, NaiveDateTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::{AppError, AppResult},
    models::{weekday_index, MINUTES_PER_DAY},
};

const MON_TO_SAT: i64 = 0b0011_1111;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ShopSettings {
    pub shop_name: String,
    /// `None` steps the slot grid by the service duration.
    pub slot_step_minutes: Option<i64>,
    pub booking_horizon_days: i64,
    pub utc_offset_minutes: i64,
    pub default_open_minute: i64,
    pub default_close_minute: i64,
    /// Bit `n` set means weekday `n` (Monday = 0) is open by default.
    pub default_open_days: i64,
}

impl Default for ShopSettings {
    fn default() -> Self {
        Self {
            shop_name: "Barberbook".to_string(),
            slot_step_minutes: None,
            booking_horizon_days: 60,
            utc_offset_minutes: 0,
            default_open_minute: 9 * 60,
            default_close_minute: 18 * 60,
            default_open_days: MON_TO_SAT,
        }
    }
}

impl ShopSettings {
    /// Wall-clock time at the shop.
    pub fn local_now(&self) -> NaiveDateTime {
        let offset = FixedOffset::east_opt((self.utc_offset_minutes * 60) as i32)
            .unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset).naive_local()
    }

    pub fn open_by_default(&self, day: Weekday) -> bool {
        self.default_open_days & (1 << weekday_index(day)) != 0
    }

    pub fn horizon(&self) -> Duration {
        Duration::days(self.booking_horizon_days)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub shop_name: Option<String>,
    /// `Some(None)` (JSON `null`) resets the step to the service duration.
    #[serde(default, with = "double_option")]
    pub slot_step_minutes: Option<Option<i64>>,
    pub booking_horizon_days: Option<i64>,
    pub utc_offset_minutes: Option<i64>,
    pub default_open_minute: Option<i64>,
    pub default_close_minute: Option<i64>,
    pub default_open_days: Option<i64>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<i64>::deserialize(deserializer).map(Some)
    }
}

pub async fn load(pool: &SqlitePool) -> AppResult<ShopSettings> {
    if let Some(settings) = fetch(pool).await? {
        return Ok(settings);
    }

    let defaults = ShopSettings::default();
    sqlx::query(
        r#"INSERT OR IGNORE INTO shop_settings
           (id, shop_name, slot_step_minutes, booking_horizon_days, utc_offset_minutes,
            default_open_minute, default_close_minute, default_open_days, updated_at)
           VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&defaults.shop_name)
    .bind(defaults.slot_step_minutes)
    .bind(defaults.booking_horizon_days)
    .bind(defaults.utc_offset_minutes)
    .bind(defaults.default_open_minute)
    .bind(defaults.default_close_minute)
    .bind(defaults.default_open_days)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    fetch(pool)
        .await?
        .ok_or_else(|| AppError::Internal("shop settings row missing after insert".into()))
}

pub async fn update(pool: &SqlitePool, patch: SettingsUpdate) -> AppResult<ShopSettings> {
    let mut settings = load(pool).await?;

    if let Some(name) = patch.shop_name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Shop name is required."));
        }
        settings.shop_name = name;
    }
    if let Some(step) = patch.slot_step_minutes {
        settings.slot_step_minutes = step;
    }
    if let Some(days) = patch.booking_horizon_days {
        settings.booking_horizon_days = days;
    }
    if let Some(offset) = patch.utc_offset_minutes {
        settings.utc_offset_minutes = offset;
    }
    if let Some(open) = patch.default_open_minute {
        settings.default_open_minute = open;
    }
    if let Some(close) = patch.default_close_minute {
        settings.default_close_minute = close;
    }
    if let Some(days) = patch.default_open_days {
        settings.default_open_days = days;
    }

    validate(&settings)?;

    sqlx::query(
        r#"UPDATE shop_settings
           SET shop_name = ?, slot_step_minutes = ?, booking_horizon_days = ?,
               utc_offset_minutes = ?, default_open_minute = ?, default_close_minute = ?,
               default_open_days = ?, updated_at = ?
           WHERE id = 1"#,
    )
    .bind(&settings.shop_name)
    .bind(settings.slot_step_minutes)
    .bind(settings.booking_horizon_days)
    .bind(settings.utc_offset_minutes)
    .bind(settings.default_open_minute)
    .bind(settings.default_close_minute)
    .bind(settings.default_open_days)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(settings)
}

fn validate(settings: &ShopSettings) -> AppResult<()> {
    if let Some(step) = settings.slot_step_minutes {
        if !(5..=MINUTES_PER_DAY).contains(&step) {
            return Err(AppError::validation("Slot step must be between 5 and 1440 minutes."));
        }
    }
    if !(1..=365).contains(&settings.booking_horizon_days) {
        return Err(AppError::validation("Booking horizon must be between 1 and 365 days."));
    }
    if !(-14 * 60..=14 * 60).contains(&settings.utc_offset_minutes) {
        return Err(AppError::validation("UTC offset must be within +/-14 hours."));
    }
    if settings.default_open_minute < 0
        || settings.default_close_minute > MINUTES_PER_DAY
        || settings.default_open_minute >= settings.default_close_minute
    {
        return Err(AppError::validation("Default opening hours are invalid."));
    }
    if !(0..=0b0111_1111).contains(&settings.default_open_days) {
        return Err(AppError::validation("Default open days must be a 7-bit weekday mask."));
    }
    Ok(())
}

async fn fetch(pool: &SqlitePool) -> Result<Option<ShopSettings>, sqlx::Error> {
    sqlx::query_as::<_, ShopSettings>(
        r#"SELECT shop_name, slot_step_minutes, booking_horizon_days, utc_offset_minutes,
                  default_open_minute, default_close_minute, default_open_days
           FROM shop_settings
           WHERE id = 1"#,
    )
    .fetch_optional(pool)
    .await
}
