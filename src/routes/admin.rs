use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    access::{authorize, Action, Resource},
    auth::{admin_validator, Principal},
    availability::{self, HoursInput},
    barbers::{self, NewBarber},
    db::{log_activity, recent_activity},
    error::AppResult,
    ledger,
    models::{format_weekday, parse_date, parse_weekday, ActivityRow, AppointmentStatus},
    routes::availability_view,
    services::{self, ServiceInput, ServiceUpdate},
    settings::{self, SettingsUpdate},
    state::AppState,
};

const RECENT_LIMIT: i64 = 100;

#[derive(Deserialize)]
struct AppointmentsQuery {
    status: Option<AppointmentStatus>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct ActiveForm {
    active: bool,
}

#[derive(Serialize)]
struct Dashboard {
    counts: BTreeMap<&'static str, i64>,
    activity: Vec<ActivityRow>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(web::resource("/appointments").route(web::get().to(list_appointments)))
            .service(web::resource("/activity").route(web::get().to(activity)))
            .service(
                web::resource("/barbers")
                    .route(web::get().to(list_barbers))
                    .route(web::post().to(create_barber)),
            )
            .service(web::resource("/barbers/{id}/active").route(web::post().to(set_barber_active)))
            .service(
                web::resource("/barbers/{id}/availability")
                    .route(web::get().to(barber_availability)),
            )
            .service(
                web::resource("/barbers/{id}/availability/{day}")
                    .route(web::put().to(set_weekly_hours)),
            )
            .service(
                web::resource("/barbers/{id}/overrides/{date}")
                    .route(web::put().to(set_override))
                    .route(web::delete().to(clear_override)),
            )
            .service(web::resource("/availability/backfill").route(web::post().to(backfill)))
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(web::resource("/services/{id}").route(web::patch().to(update_service)))
            .service(
                web::resource("/settings")
                    .route(web::get().to(get_settings))
                    .route(web::put().to(update_settings)),
            ),
    );
}

async fn dashboard(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ViewSchedule, Resource::Shop)?;

    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM appointments GROUP BY status")
            .fetch_all(&state.db)
            .await?;

    let mut counts = BTreeMap::new();
    for status in [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ] {
        let value = rows
            .iter()
            .find(|(name, _)| name == status.as_str())
            .map_or(0, |(_, count)| *count);
        counts.insert(status.as_str(), value);
    }

    Ok(HttpResponse::Ok().json(Dashboard {
        counts,
        activity: recent_activity(&state.db, 10).await?,
    }))
}

async fn list_appointments(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    query: web::Query<AppointmentsQuery>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ViewSchedule, Resource::Shop)?;
    let limit = query.limit.unwrap_or(RECENT_LIMIT).clamp(1, 500);
    let appointments = ledger::list_recent(&state.db, query.status, limit).await?;
    Ok(HttpResponse::Ok().json(appointments))
}

async fn activity(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ViewSchedule, Resource::Shop)?;
    Ok(HttpResponse::Ok().json(recent_activity(&state.db, 50).await?))
}

async fn list_barbers(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageBarbers, Resource::Shop)?;
    Ok(HttpResponse::Ok().json(barbers::list_all(&state.db).await?))
}

async fn create_barber(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    payload: web::Json<NewBarber>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageBarbers, Resource::Shop)?;
    let barber = barbers::create(&state.db, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "barber_created",
        &format!("{} added barber {}.", auth.display_name, barber.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Created().json(barber))
}

async fn set_barber_active(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    form: web::Json<ActiveForm>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageBarbers, Resource::Shop)?;
    let barber = barbers::set_active(&state.db, &path.into_inner(), form.active).await?;

    let verb = if barber.active { "activated" } else { "deactivated" };
    log_activity(
        &state.db,
        "barber_active",
        &format!("{} {verb} barber {}.", auth.display_name, barber.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(barber))
}

async fn barber_availability(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let barber_id = path.into_inner();
    authorize(&auth, Action::ViewSchedule, Resource::Barber(&barber_id))?;
    let today = settings::load(&state.db).await?.local_now().date();
    Ok(HttpResponse::Ok().json(availability_view(&state.db, &barber_id, today).await?))
}

async fn set_weekly_hours(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<(String, String)>,
    payload: web::Json<HoursInput>,
) -> AppResult<HttpResponse> {
    let (barber_id, day) = path.into_inner();
    authorize(&auth, Action::ManageAvailability, Resource::Barber(&barber_id))?;
    let day = parse_weekday(&day)?;
    let rule = availability::upsert_rule(&state.db, &barber_id, day, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "availability_updated",
        &format!(
            "{} updated {} hours for barber {barber_id}.",
            auth.display_name,
            format_weekday(day)
        ),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(rule))
}

async fn set_override(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<(String, String)>,
    payload: web::Json<HoursInput>,
) -> AppResult<HttpResponse> {
    let (barber_id, date) = path.into_inner();
    authorize(&auth, Action::ManageAvailability, Resource::Barber(&barber_id))?;
    let date = parse_date(&date)?;
    let entry =
        availability::upsert_override(&state.db, &barber_id, date, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "override_updated",
        &format!(
            "{} set an override for barber {barber_id} on {}.",
            auth.display_name, entry.date
        ),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(entry))
}

async fn clear_override(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (barber_id, date) = path.into_inner();
    authorize(&auth, Action::ManageAvailability, Resource::Barber(&barber_id))?;
    availability::delete_override(&state.db, &barber_id, parse_date(&date)?).await?;

    log_activity(
        &state.db,
        "override_updated",
        &format!(
            "{} cleared the override for barber {barber_id} on {date}.",
            auth.display_name
        ),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

async fn backfill(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageAvailability, Resource::Shop)?;
    let settings = settings::load(&state.db).await?;
    let added = availability::backfill_defaults(&state.db, &settings).await?;

    log_activity(
        &state.db,
        "availability_backfill",
        &format!("{} backfilled {added} default availability rules.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(json!({ "added": added })))
}

async fn list_services(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageCatalog, Resource::Shop)?;
    Ok(HttpResponse::Ok().json(services::list_all(&state.db).await?))
}

async fn create_service(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    payload: web::Json<ServiceInput>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageCatalog, Resource::Shop)?;
    let service = services::create(&state.db, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "service_created",
        &format!("{} added service {}.", auth.display_name, service.name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Created().json(service))
}

async fn update_service(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    payload: web::Json<ServiceUpdate>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageCatalog, Resource::Shop)?;
    let service = services::update(&state.db, &path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(service))
}

async fn get_settings(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageSettings, Resource::Shop)?;
    Ok(HttpResponse::Ok().json(settings::load(&state.db).await?))
}

async fn update_settings(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    payload: web::Json<SettingsUpdate>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageSettings, Resource::Shop)?;
    let updated = settings::update(&state.db, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "settings_updated",
        &format!("{} updated shop settings.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(updated))
}
