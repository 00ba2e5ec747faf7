//! Bookable slot resolution.
//!
//! The grid is derived from the barber's effective window for a date, stepped
//! by the shop's slot step (or the service duration), with every candidate that
//! overlaps a live appointment or already started removed. Identical inputs
//! always yield identical output; the booking path re-runs the same checks at
//! commit time.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    availability, barbers,
    error::{AppError, AppResult},
    ledger,
    models::{format_minute, Window},
    settings::ShopSettings,
};

/// Half-open interval `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, duration: i64) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    #[serde(serialize_with = "as_clock")]
    pub start: i64,
    #[serde(serialize_with = "as_clock")]
    pub end: i64,
}

fn as_clock<S: serde::Serializer>(minute: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_minute(*minute))
}

/// Start minutes from `window.start` while `start + duration <= window.end`.
pub fn candidate_starts(window: Window, duration: i64, step: i64) -> impl Iterator<Item = i64> {
    let last_start = window.end_minute - duration;
    let step = step.max(1);
    (window.start_minute..=last_start)
        .step_by(step as usize)
        .take_while(move |_| duration > 0)
}

pub fn conflicts(booked: &[Interval], candidate: &Interval) -> bool {
    booked.iter().any(|interval| interval.overlaps(candidate))
}

/// Pure grid computation. `not_before` drops candidates starting earlier
/// (used for "today").
pub fn resolve(
    window: Option<Window>,
    booked: &[Interval],
    duration: i64,
    step: i64,
    not_before: Option<i64>,
) -> Vec<Slot> {
    let Some(window) = window else {
        return Vec::new();
    };

    candidate_starts(window, duration, step)
        .filter(|start| not_before.map_or(true, |earliest| *start >= earliest))
        .map(|start| Interval::new(start, duration))
        .filter(|candidate| !conflicts(booked, candidate))
        .map(|candidate| Slot {
            start: candidate.start,
            end: candidate.end,
        })
        .collect()
}

pub fn step_for(settings: &ShopSettings, duration: i64) -> i64 {
    settings.slot_step_minutes.unwrap_or(duration)
}

pub fn minute_of_day(at: NaiveDateTime) -> i64 {
    i64::from(at.hour()) * 60 + i64::from(at.minute())
}

/// Bookable slots for `barber_id` on `date` given the ledger as it is now.
/// Unknown barbers fail with `NotFound`; inactive barbers, past dates and
/// dates beyond the booking horizon have no slots.
pub async fn resolve_slots(
    pool: &SqlitePool,
    settings: &ShopSettings,
    barber_id: &str,
    date: NaiveDate,
    service_duration: i64,
    now: NaiveDateTime,
) -> AppResult<Vec<Slot>> {
    if service_duration <= 0 {
        return Err(AppError::validation("Service duration must be positive."));
    }

    let mut conn = pool.acquire().await?;
    let barber = barbers::find(&mut conn, barber_id)
        .await?
        .ok_or_else(|| AppError::not_found("Barber not found"))?;

    let today = now.date();
    if barber.active == 0 || date < today || date > today + settings.horizon() {
        return Ok(Vec::new());
    }

    let window = availability::effective_window(&mut conn, barber_id, date).await?;
    let booked = ledger::booked_intervals(&mut *conn, barber_id, date).await?;
    let not_before = (date == today).then(|| minute_of_day(now));

    Ok(resolve(
        window,
        &booked,
        service_duration,
        step_for(settings, service_duration),
        not_before,
    ))
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::{
        availability::{upsert_rule, HoursInput},
        db::{insert_test_user, test_pool},
        models::Role,
    };

    fn nine_to_six() -> Option<Window> {
        Some(Window::new(9 * 60, 18 * 60).unwrap())
    }

    fn starts(slots: &[Slot]) -> Vec<String> {
        slots.iter().map(|slot| format_minute(slot.start)).collect()
    }

    #[test]
    fn overlap_is_half_open() {
        let a = Interval::new(600, 60);
        assert!(a.overlaps(&Interval::new(630, 60)));
        assert!(a.overlaps(&Interval::new(570, 60)));
        assert!(!a.overlaps(&Interval::new(660, 60)));
        assert!(!a.overlaps(&Interval::new(540, 60)));
    }

    #[test]
    fn hourly_service_fills_the_day() {
        let slots = resolve(nine_to_six(), &[], 60, 60, None);
        assert_eq!(
            starts(&slots),
            vec!["09:00", "10:00", "11:00", "12:00", "13:00", "14:00", "15:00", "16:00", "17:00"]
        );
        assert_eq!(slots[8].end, 18 * 60);
    }

    #[test]
    fn booked_hour_is_excluded() {
        let booked = [Interval::new(11 * 60, 60)];
        let slots = resolve(nine_to_six(), &booked, 60, 60, None);
        assert_eq!(slots.len(), 8);
        assert!(!starts(&slots).contains(&"11:00".to_string()));
    }

    #[test]
    fn finer_step_drops_every_overlapping_candidate() {
        let booked = [Interval::new(11 * 60, 60)];
        let slots = resolve(nine_to_six(), &booked, 60, 30, None);
        let starts = starts(&slots);
        assert!(starts.contains(&"10:00".to_string()));
        assert!(!starts.contains(&"10:30".to_string()));
        assert!(!starts.contains(&"11:00".to_string()));
        assert!(!starts.contains(&"11:30".to_string()));
        assert!(starts.contains(&"12:00".to_string()));
        assert_eq!(starts.last().map(String::as_str), Some("17:00"));
        for slot in &slots {
            assert!(!conflicts(&booked, &Interval::new(slot.start, 60)));
        }
    }

    #[test]
    fn closed_day_has_no_slots() {
        assert!(resolve(None, &[], 60, 60, None).is_empty());
    }

    #[test]
    fn service_longer_than_window_has_no_slots() {
        let window = Some(Window::new(9 * 60, 10 * 60).unwrap());
        assert!(resolve(window, &[], 90, 30, None).is_empty());
    }

    #[test]
    fn started_slots_are_dropped_today() {
        let slots = resolve(nine_to_six(), &[], 60, 60, Some(13 * 60 + 5));
        assert_eq!(starts(&slots), vec!["14:00", "15:00", "16:00", "17:00"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let booked = [Interval::new(9 * 60, 45), Interval::new(15 * 60, 30)];
        let first = resolve(nine_to_six(), &booked, 45, 15, Some(10 * 60));
        let second = resolve(nine_to_six(), &booked, 45, 15, Some(10 * 60));
        assert_eq!(first, second);
    }

    #[test]
    fn slot_serializes_as_clock_times() {
        let json = serde_json::to_value(Slot { start: 540, end: 600 }).unwrap();
        assert_eq!(json, serde_json::json!({ "start": "09:00", "end": "10:00" }));
    }

    /// Sunday 2030-01-06, mid-morning.
    fn sunday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 1, 6)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    async fn monday_barber(pool: &SqlitePool) -> String {
        let barber = insert_test_user(pool, "sam", Role::Barber).await;
        upsert_rule(pool, &barber, Weekday::Mon, HoursInput::open("09:00", "12:00"))
            .await
            .unwrap();
        barber
    }

    #[actix_web::test]
    async fn inactive_barber_has_no_slots() {
        let pool = test_pool().await;
        let barber = monday_barber(&pool).await;
        let settings = ShopSettings::default();
        let monday = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();

        let open = resolve_slots(&pool, &settings, &barber, monday, 60, sunday_morning())
            .await
            .unwrap();
        assert_eq!(starts(&open), vec!["09:00", "10:00", "11:00"]);

        barbers::set_active(&pool, &barber, false).await.unwrap();
        let slots = resolve_slots(&pool, &settings, &barber, monday, 60, sunday_morning())
            .await
            .unwrap();
        assert!(slots.is_empty());
    }

    #[actix_web::test]
    async fn dates_past_the_horizon_have_no_slots() {
        let pool = test_pool().await;
        let barber = monday_barber(&pool).await;
        let settings = ShopSettings::default();

        // 57 and 64 days out against a 60 day horizon, both Mondays.
        let inside = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
        let beyond = NaiveDate::from_ymd_opt(2030, 3, 11).unwrap();

        let slots = resolve_slots(&pool, &settings, &barber, inside, 60, sunday_morning())
            .await
            .unwrap();
        assert_eq!(slots.len(), 3);

        let slots = resolve_slots(&pool, &settings, &barber, beyond, 60, sunday_morning())
            .await
            .unwrap();
        assert!(slots.is_empty());
    }

    #[actix_web::test]
    async fn unknown_barber_is_not_found() {
        let pool = test_pool().await;
        let err = resolve_slots(
            &pool,
            &ShopSettings::default(),
            "nobody",
            NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            60,
            sunday_morning(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
