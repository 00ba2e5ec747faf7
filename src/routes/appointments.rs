use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    access::{authorize, Action, Resource},
    auth::{basic_validator, Principal},
    booking::{self, BookingRequest},
    db::log_activity,
    error::AppResult,
    ledger,
    lifecycle::{self, StatusAction},
    models::{format_minute, parse_date, parse_minute, Role},
    push::{self, PushSubscriptionInput},
    settings,
    state::{AppState, DomainEvent},
};

#[derive(Deserialize)]
struct BookingPayload {
    barber_id: String,
    service_id: String,
    date: String,
    time: String,
    notes: Option<String>,
    /// Staff booking on behalf of a client; clients book for themselves.
    client_id: Option<String>,
}

#[derive(Deserialize)]
struct StatusPayload {
    action: StatusAction,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/appointments")
            .wrap(HttpAuthentication::basic(basic_validator))
            .service(
                web::resource("")
                    .route(web::get().to(list_mine))
                    .route(web::post().to(create_booking)),
            )
            .service(web::resource("/{id}").route(web::get().to(show)))
            .service(web::resource("/{id}/status").route(web::post().to(update_status)))
            .service(web::resource("/{id}/subscribe").route(web::post().to(subscribe))),
    );
}

async fn create_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    payload: web::Json<BookingPayload>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    let client_id = payload.client_id.unwrap_or_else(|| auth.id.clone());
    authorize(
        &auth,
        Action::Book,
        Resource::Booking {
            barber_id: &payload.barber_id,
            client_id: &client_id,
        },
    )?;

    let request = BookingRequest {
        barber_id: payload.barber_id,
        client_id,
        service_id: payload.service_id,
        date: parse_date(&payload.date)?,
        start_minute: parse_minute(&payload.time)?,
        notes: payload.notes,
    };

    let settings = settings::load(&state.db).await?;
    let appointment = booking::book(&state.db, &settings, request, settings.local_now()).await?;

    log_activity(
        &state.db,
        "appointment_booked",
        &format!(
            "{} booked {} at {}.",
            auth.display_name,
            appointment.date,
            format_minute(appointment.time)
        ),
        Some(&auth.id),
        Some(&appointment.id),
    )
    .await;
    state.publish(DomainEvent::booked(&appointment));

    Ok(HttpResponse::Created().json(appointment))
}

async fn list_mine(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    let appointments = match auth.role {
        Role::Client => ledger::list_for_client(&state.db, &auth.id).await?,
        Role::Barber => {
            let today = settings::load(&state.db).await?.local_now().date();
            ledger::list_upcoming_for_barber(&state.db, &auth.id, today).await?
        }
        Role::Admin => ledger::list_recent(&state.db, None, 100).await?,
    };
    Ok(HttpResponse::Ok().json(appointments))
}

async fn show(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let appointment = ledger::get(&state.db, &path.into_inner()).await?;
    authorize(
        &auth,
        Action::ViewAppointment,
        Resource::Appointment {
            barber_id: &appointment.barber_id,
            client_id: &appointment.client_id,
            status: appointment.status,
        },
    )?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn update_status(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    payload: web::Json<StatusPayload>,
) -> AppResult<HttpResponse> {
    let appointment_id = path.into_inner();
    let action = payload.into_inner().action;
    let (appointment, previous) =
        lifecycle::apply(&state.db, &auth, &appointment_id, action).await?;

    log_activity(
        &state.db,
        "appointment_status",
        &format!(
            "{} applied {} to appointment {} ({} -> {}).",
            auth.display_name,
            action.as_str(),
            appointment_id,
            previous.as_str(),
            appointment.status.as_str()
        ),
        Some(&auth.id),
        Some(&appointment_id),
    )
    .await;
    state.publish(DomainEvent::status_changed(&appointment, previous));

    Ok(HttpResponse::Ok().json(appointment))
}

async fn subscribe(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    payload: web::Json<PushSubscriptionInput>,
) -> AppResult<HttpResponse> {
    let appointment = ledger::get(&state.db, &path.into_inner()).await?;
    authorize(
        &auth,
        Action::ViewAppointment,
        Resource::Appointment {
            barber_id: &appointment.barber_id,
            client_id: &appointment.client_id,
            status: appointment.status,
        },
    )?;

    push::store_subscription(&state.db, &appointment.id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}
