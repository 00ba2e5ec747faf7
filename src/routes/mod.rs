pub mod admin;
pub mod appointments;
pub mod barber;
pub mod events;
pub mod public;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    availability,
    error::AppResult,
    models::{AvailabilityOverride, AvailabilityRule},
};

#[derive(Debug, Serialize)]
pub struct AvailabilityView {
    pub barber_id: String,
    pub rules: Vec<AvailabilityRule>,
    pub overrides: Vec<AvailabilityOverride>,
}

/// Weekly rules plus overrides from `from` onwards.
pub async fn availability_view(
    pool: &SqlitePool,
    barber_id: &str,
    from: NaiveDate,
) -> AppResult<AvailabilityView> {
    Ok(AvailabilityView {
        barber_id: barber_id.to_string(),
        rules: availability::get_rules(pool, barber_id).await?,
        overrides: availability::list_overrides(pool, barber_id, from).await?,
    })
}

#[cfg(test)]
pub mod test_support {
    use actix_web::{test::TestRequest, web};
    use actix_web_httpauth::headers::authorization::{Authorization, Basic};

    use crate::{
        db,
        models::Role,
        state::{AppState, PushConfig},
    };

    pub const PASSWORD: &str = "correct horse";

    pub async fn state() -> AppState {
        let pool = db::test_pool().await;
        AppState::new(
            pool,
            PushConfig {
                public_key: String::new(),
                private_key: String::new(),
                subject: String::new(),
            },
        )
    }

    pub async fn user(state: &AppState, username: &str, role: Role) -> String {
        db::insert_user(&state.db, username, username, role, PASSWORD)
            .await
            .expect("insert user")
    }

    pub fn basic(request: TestRequest, username: &str) -> TestRequest {
        let credentials = Basic::new(username.to_string(), Some(PASSWORD));
        request.insert_header(Authorization::from(credentials))
    }

    pub fn data(state: &AppState) -> web::Data<AppState> {
        web::Data::new(state.clone())
    }
}
