use actix_web::{http::header, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::{basic_validator, Principal},
    error::{AppError, AppResult},
    models::Role,
    state::{AppState, DomainEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events")
            .wrap(HttpAuthentication::basic(basic_validator))
            .route(web::get().to(stream_events)),
    );
}

/// Barbers only see their own calendar; admins see the whole shop.
fn visible_to(principal: &Principal, event: &DomainEvent) -> bool {
    match principal.role {
        Role::Admin => true,
        Role::Barber => event.barber_id == principal.id,
        Role::Client => false,
    }
}

async fn stream_events(
    state: web::Data<AppState>,
    auth: web::ReqData<Principal>,
) -> AppResult<HttpResponse> {
    let principal = auth.into_inner();
    if principal.role == Role::Client {
        return Err(AppError::unauthorized("Staff access required"));
    }

    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if visible_to(&principal, &event) => {
            Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
        }
        Ok(_) => None,
        Err(err) => {
            log::warn!("Event stream dropped events: {err}");
            None
        }
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

fn event_to_bytes(event: &DomainEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: {}\ndata: {}\n\n", event.kind.as_str(), payload))
}
