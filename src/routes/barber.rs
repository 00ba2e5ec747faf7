use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    access::{authorize, Action, Resource},
    auth::{barber_validator, Principal},
    availability::{self, HoursInput},
    db::log_activity,
    error::AppResult,
    ledger,
    models::{format_weekday, parse_date, parse_weekday},
    routes::availability_view,
    settings,
    state::AppState,
};

#[derive(Deserialize)]
struct DayQuery {
    date: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/barber")
            .wrap(HttpAuthentication::basic(barber_validator))
            .service(web::resource("/appointments").route(web::get().to(day_sheet)))
            .service(web::resource("/availability").route(web::get().to(own_availability)))
            .service(web::resource("/availability/{day}").route(web::put().to(set_weekly_hours)))
            .service(
                web::resource("/overrides/{date}")
                    .route(web::put().to(set_override))
                    .route(web::delete().to(clear_override)),
            ),
    );
}

/// Live appointments for one day, defaulting to the shop's today.
async fn day_sheet(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    query: web::Query<DayQuery>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ViewSchedule, Resource::Barber(&auth.id))?;
    let date = match query.date.as_deref() {
        Some(value) => parse_date(value)?,
        None => settings::load(&state.db).await?.local_now().date(),
    };
    let appointments = ledger::list_for_barber_on_date(&state.db, &auth.id, date).await?;
    Ok(HttpResponse::Ok().json(appointments))
}

async fn own_availability(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ViewSchedule, Resource::Barber(&auth.id))?;
    let today = settings::load(&state.db).await?.local_now().date();
    let view = availability_view(&state.db, &auth.id, today).await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn set_weekly_hours(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    payload: web::Json<HoursInput>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageAvailability, Resource::Barber(&auth.id))?;
    let day = parse_weekday(&path.into_inner())?;
    let rule = availability::upsert_rule(&state.db, &auth.id, day, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "availability_updated",
        &format!("{} updated {} hours.", auth.display_name, format_weekday(day)),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(rule))
}

async fn set_override(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
    payload: web::Json<HoursInput>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageAvailability, Resource::Barber(&auth.id))?;
    let date = parse_date(&path.into_inner())?;
    let entry =
        availability::upsert_override(&state.db, &auth.id, date, payload.into_inner()).await?;

    log_activity(
        &state.db,
        "override_updated",
        &format!("{} set an override for {date}.", auth.display_name),
        Some(&auth.id),
        None,
    )
    .await;
    Ok(HttpResponse::Ok().json(entry))
}

async fn clear_override(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    authorize(&auth, Action::ManageAvailability, Resource::Barber(&auth.id))?;
    let date = parse_date(&path.into_inner())?;
    availability::delete_override(&state.db, &auth.id, date).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::{
        models::Role,
        routes::test_support::{self, basic},
    };

    #[actix_web::test]
    async fn barber_manages_own_hours_and_overrides() {
        let state = test_support::state().await;
        test_support::user(&state, "sam", Role::Barber).await;
        let app = test::init_service(
            App::new()
                .app_data(test_support::data(&state))
                .configure(configure),
        )
        .await;

        let req = basic(test::TestRequest::put().uri("/barber/availability/mon"), "sam")
            .set_json(json!({ "is_available": true, "start_time": "09:00", "end_time": "17:00" }))
            .to_request();
        let rule: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(rule["day_of_week"], "MON");
        assert_eq!(rule["start_time"], "09:00");

        let req = basic(test::TestRequest::put().uri("/barber/availability/mon"), "sam")
            .set_json(json!({ "is_available": true, "start_time": "17:00", "end_time": "09:00" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let date = chrono::Utc::now().date_naive() + Duration::days(4);
        let req = basic(test::TestRequest::put().uri(&format!("/barber/overrides/{date}")), "sam")
            .set_json(json!({ "is_available": false, "reason": "Holiday" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = basic(test::TestRequest::get().uri("/barber/availability"), "sam").to_request();
        let view: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["rules"].as_array().unwrap().len(), 1);
        assert_eq!(view["overrides"][0]["reason"], "Holiday");

        let uri = format!("/barber/overrides/{date}");
        let req = basic(test::TestRequest::delete().uri(&uri), "sam").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        let req = basic(test::TestRequest::delete().uri(&uri), "sam").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn clients_are_kept_out() {
        let state = test_support::state().await;
        test_support::user(&state, "cli", Role::Client).await;
        let app = test::init_service(
            App::new()
                .app_data(test_support::data(&state))
                .configure(configure),
        )
        .await;

        let req = basic(test::TestRequest::get().uri("/barber/appointments"), "cli").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get().uri("/barber/appointments").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn day_sheet_rejects_bad_dates() {
        let state = test_support::state().await;
        test_support::user(&state, "sam", Role::Barber).await;
        let app = test::init_service(
            App::new()
                .app_data(test_support::data(&state))
                .configure(configure),
        )
        .await;

        let req = basic(test::TestRequest::get().uri("/barber/appointments?date=tomorrow"), "sam")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = basic(test::TestRequest::get().uri("/barber/appointments"), "sam").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.as_array().unwrap().is_empty());
    }
}
