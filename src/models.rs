use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Barber,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Barber => "barber",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Role::Client),
            "barber" => Some(Role::Barber),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BarberRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Barber {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub initials: String,
    pub active: bool,
}

impl From<BarberRow> for Barber {
    fn from(row: BarberRow) -> Self {
        let initials = row
            .display_name
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .take(2)
            .collect::<String>()
            .to_uppercase();
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            initials,
            active: row.active != 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub duration_minutes: i64,
    pub price_cents: i64,
    pub barber_id: Option<String>,
    #[serde(serialize_with = "serialize_flag")]
    pub active: i64,
}

impl ServiceRow {
    pub fn is_active(&self) -> bool {
        self.active != 0
    }

    /// Global services are offered by every barber.
    pub fn offered_by(&self, barber_id: &str) -> bool {
        self.barber_id.as_deref().map_or(true, |owner| owner == barber_id)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AvailabilityRuleRow {
    pub barber_id: String,
    pub day_of_week: i64,
    pub start_minute: i64,
    pub end_minute: i64,
    pub is_available: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OverrideRow {
    pub barber_id: String,
    pub date: String,
    pub is_available: i64,
    pub start_minute: Option<i64>,
    pub end_minute: Option<i64>,
    pub reason: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub barber_id: String,
    pub client_id: String,
    pub service_id: String,
    pub date: String,
    pub start_minute: i64,
    pub duration_minutes: i64,
    pub price_cents: i64,
    pub status: String,
    pub payment_status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityRow {
    pub kind: String,
    pub message: String,
    pub created_at: String,
}

/// Daily opening window in minutes since midnight, half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_minute: i64,
    pub end_minute: i64,
}

impl Window {
    pub fn new(start_minute: i64, end_minute: i64) -> AppResult<Self> {
        if !(0..=MINUTES_PER_DAY).contains(&start_minute)
            || !(0..=MINUTES_PER_DAY).contains(&end_minute)
        {
            return Err(AppError::validation("Times must fall within a single day."));
        }
        if start_minute >= end_minute {
            return Err(AppError::validation("Start time must be before end time."));
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityRule {
    pub barber_id: String,
    #[serde(serialize_with = "serialize_weekday")]
    pub day_of_week: Weekday,
    #[serde(serialize_with = "serialize_minute")]
    pub start_time: i64,
    #[serde(serialize_with = "serialize_minute")]
    pub end_time: i64,
    pub is_available: bool,
}

impl AvailabilityRule {
    /// `None` when the barber does not work that day.
    pub fn window(&self) -> Option<Window> {
        if !self.is_available {
            return None;
        }
        Window::new(self.start_time, self.end_time).ok()
    }
}

impl TryFrom<AvailabilityRuleRow> for AvailabilityRule {
    type Error = AppError;

    fn try_from(row: AvailabilityRuleRow) -> AppResult<Self> {
        Ok(Self {
            barber_id: row.barber_id,
            day_of_week: weekday_from_index(row.day_of_week)?,
            start_time: row.start_minute,
            end_time: row.end_minute,
            is_available: row.is_available != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityOverride {
    pub barber_id: String,
    pub date: NaiveDate,
    pub is_available: bool,
    #[serde(serialize_with = "serialize_opt_minute")]
    pub start_time: Option<i64>,
    #[serde(serialize_with = "serialize_opt_minute")]
    pub end_time: Option<i64>,
    pub reason: Option<String>,
}

impl AvailabilityOverride {
    pub fn window(&self) -> Option<Window> {
        if !self.is_available {
            return None;
        }
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Window::new(start, end).ok(),
            _ => None,
        }
    }
}

impl TryFrom<OverrideRow> for AvailabilityOverride {
    type Error = AppError;

    fn try_from(row: OverrideRow) -> AppResult<Self> {
        Ok(Self {
            barber_id: row.barber_id,
            date: parse_date(&row.date)?,
            is_available: row.is_available != 0,
            start_time: row.start_minute,
            end_time: row.end_minute,
            reason: row.reason,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: String,
    pub barber_id: String,
    pub client_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    #[serde(serialize_with = "serialize_minute")]
    pub time: i64,
    pub duration_minutes: i64,
    pub price_cents: i64,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub paid_at: Option<String>,
}


impl TryFrom<AppointmentRow> for Appointment {
    type Error = AppError;

    fn try_from(row: AppointmentRow) -> AppResult<Self> {
        let status = AppointmentStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(format!("unknown appointment status '{}'", row.status))
        })?;
        let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
            AppError::Internal(format!("unknown payment status '{}'", row.payment_status))
        })?;
        Ok(Self {
            id: row.id,
            barber_id: row.barber_id,
            client_id: row.client_id,
            service_id: row.service_id,
            date: parse_date(&row.date)?,
            time: row.start_minute,
            duration_minutes: row.duration_minutes,
            price_cents: row.price_cents,
            status,
            payment_status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
        })
    }
}

pub fn weekday_index(day: Weekday) -> i64 {
    i64::from(day.num_days_from_monday())
}

pub fn weekday_from_index(index: i64) -> AppResult<Weekday> {
    let day = match index {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        6 => Weekday::Sun,
        other => return Err(AppError::Internal(format!("invalid weekday index {other}"))),
    };
    Ok(day)
}

/// Accepts `MON`, `mon`, `Monday`, ...
pub fn parse_weekday(value: &str) -> AppResult<Weekday> {
    value
        .trim()
        .parse::<Weekday>()
        .map_err(|_| AppError::validation(format!("Unknown day of week '{value}'.")))
}

pub fn format_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date '{value}', expected YYYY-MM-DD.")))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses `HH:MM`; `24:00` is accepted as the end of the day.
pub fn parse_minute(value: &str) -> AppResult<i64> {
    let invalid = || AppError::validation(format!("Invalid time '{value}', expected HH:MM."));
    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: i64 = hours.parse().map_err(|_| invalid())?;
    let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
    if !(0..60).contains(&minutes) || !(0..=24).contains(&hours) {
        return Err(invalid());
    }
    let total = hours * 60 + minutes;
    if total > MINUTES_PER_DAY {
        return Err(invalid());
    }
    Ok(total)
}

pub fn format_minute(minute: i64) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

fn serialize_minute<S: serde::Serializer>(minute: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_minute(*minute))
}

fn serialize_opt_minute<S: serde::Serializer>(
    minute: &Option<i64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match minute {
        Some(minute) => serializer.serialize_str(&format_minute(*minute)),
        None => serializer.serialize_none(),
    }
}

fn serialize_flag<S: serde::Serializer>(flag: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(*flag != 0)
}

fn serialize_weekday<S: serde::Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(format_weekday(*day))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_clock_times() {
        assert_eq!(parse_minute("09:00").unwrap(), 540);
        assert_eq!(parse_minute("17:45").unwrap(), 1065);
        assert_eq!(parse_minute("24:00").unwrap(), MINUTES_PER_DAY);
        assert!(parse_minute("24:30").is_err());
        assert!(parse_minute("9:00").is_err());
        assert!(parse_minute("09:60").is_err());
        assert_eq!(format_minute(540), "09:00");
        assert_eq!(format_minute(1065), "17:45");
    }

    #[test]
    fn weekday_round_trips_through_index() {
        for index in 0..7 {
            let day = weekday_from_index(index).unwrap();
            assert_eq!(weekday_index(day), index);
        }
        assert!(weekday_from_index(7).is_err());
        assert_eq!(parse_weekday("MON").unwrap(), Weekday::Mon);
        assert_eq!(parse_weekday("sunday").unwrap(), Weekday::Sun);
        assert!(parse_weekday("someday").is_err());
    }

    #[test]
    fn window_rejects_inverted_hours() {
        assert!(Window::new(600, 540).is_err());
        assert!(Window::new(540, 540).is_err());
        assert!(Window::new(-10, 540).is_err());
        assert_eq!(
            Window::new(540, 1080).unwrap(),
            Window {
                start_minute: 540,
                end_minute: 1080
            }
        );
    }

    #[test]
    fn closed_rule_has_no_window() {
        let rule = AvailabilityRule {
            barber_id: "b".into(),
            day_of_week: Weekday::Mon,
            start_time: 540,
            end_time: 1080,
            is_available: false,
        };
        assert_eq!(rule.window(), None);
    }

    #[test]
    fn appointment_serializes_clock_time() {
        let appointment = Appointment {
            id: "a".into(),
            barber_id: "b".into(),
            client_id: "c".into(),
            service_id: "s".into(),
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            time: 660,
            duration_minutes: 60,
            price_cents: 3500,
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            notes: None,
            created_at: String::new(),
            updated_at: String::new(),
            paid_at: None,
        };
        let json = serde_json::to_value(&appointment).unwrap();
        assert_eq!(json["time"], "11:00");
        assert_eq!(json["date"], "2030-01-07");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["payment_status"], "unpaid");
    }
}
