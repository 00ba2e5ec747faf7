use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    barbers,
    db::{insert_user, log_activity},
    error::{is_unique_violation, AppError, AppResult},
    models::{parse_date, Role},
    routes::availability_view,
    services, settings,
    slots::{self, Slot},
    state::AppState,
};

#[derive(Deserialize)]
struct ServicesQuery {
    barber_id: Option<String>,
}

#[derive(Deserialize)]
struct SlotsQuery {
    date: String,
    service_id: String,
}

#[derive(Serialize)]
struct SlotsResponse {
    barber_id: String,
    date: String,
    service_id: String,
    duration_minutes: i64,
    slots: Vec<Slot>,
}

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    display_name: String,
    password: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/services").route(web::get().to(list_services)))
        .service(web::resource("/barbers").route(web::get().to(list_barbers)))
        .service(web::resource("/barbers/{id}/availability").route(web::get().to(barber_availability)))
        .service(web::resource("/barbers/{id}/slots").route(web::get().to(barber_slots)))
        .service(web::resource("/register").route(web::post().to(register)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn list_services(
    state: web::Data<AppState>,
    query: web::Query<ServicesQuery>,
) -> AppResult<HttpResponse> {
    let services = services::list_active(&state.db, query.barber_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(services))
}

async fn list_barbers(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let barbers = barbers::list_active(&state.db).await?;
    Ok(HttpResponse::Ok().json(barbers))
}

async fn barber_availability(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let barber_id = path.into_inner();
    let today = settings::load(&state.db).await?.local_now().date();
    let view = availability_view(&state.db, &barber_id, today).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn barber_slots(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SlotsQuery>,
) -> AppResult<HttpResponse> {
    let barber_id = path.into_inner();
    let query = query.into_inner();
    let date = parse_date(&query.date)?;

    let service = services::get(&state.db, &query.service_id).await?;
    if !service.is_active() {
        return Err(AppError::not_found("Service not found"));
    }
    if !service.offered_by(&barber_id) {
        return Err(AppError::validation("This barber does not offer that service."));
    }

    let settings = settings::load(&state.db).await?;
    let slots = slots::resolve_slots(
        &state.db,
        &settings,
        &barber_id,
        date,
        service.duration_minutes,
        settings.local_now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(SlotsResponse {
        barber_id,
        date: query.date,
        service_id: service.id,
        duration_minutes: service.duration_minutes,
        slots,
    }))
}

async fn register(
    state: web::Data<AppState>,
    form: web::Json<RegisterForm>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let username = form.username.trim();
    let display_name = form.display_name.trim();

    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push("Username is required.");
    }
    if display_name.is_empty() {
        errors.push("Full name is required.");
    }
    if form.password.len() < 8 {
        errors.push("Password must be at least 8 characters.");
    }
    if !errors.is_empty() {
        return Err(AppError::validation(errors.join(" ")));
    }

    let id = insert_user(&state.db, username, display_name, Role::Client, &form.password)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::validation("Username already exists.")
            } else {
                AppError::Database(err)
            }
        })?;

    log_activity(
        &state.db,
        "client_registered",
        &format!("{display_name} registered."),
        Some(&id),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(json!({ "id": id, "username": username })))
}
