use actix_web::{dev::ServiceRequest, error::ErrorForbidden, web, Error, HttpMessage};
use actix_web_httpauth::extractors::{
    basic::{self, BasicAuth},
    AuthenticationError,
};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::{
    models::{Role, UserRow},
    state::AppState,
};

const AUTH_REALM: &str = "Barberbook";

/// The authenticated caller, inserted into request extensions by the validators.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// 401 carrying a `WWW-Authenticate` challenge for the shop realm.
fn challenge() -> Error {
    AuthenticationError::from(basic::Config::default().realm(AUTH_REALM)).into()
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<Principal, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(challenge)?;
    let username = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(state, username, password)
        .await
        .ok_or_else(challenge)
}

pub async fn authenticate_credentials(
    state: &AppState,
    username: &str,
    password: &str,
) -> Option<Principal> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"SELECT id, username, display_name, role, password_hash, active, created_at
           FROM users
           WHERE username = ? AND active = 1
           LIMIT 1"#,
    )
    .bind(username)
    .fetch_optional(&state.db)
    .await
    .ok()??;

    if !verify_password(password, &user.password_hash) {
        return None;
    }

    let Some(role) = Role::parse(&user.role) else {
        log::warn!("User {} has unknown role '{}'", user.id, user.role);
        return None;
    };

    Some(Principal {
        id: user.id,
        display_name: user.display_name,
        role,
    })
}

async fn validate_role(
    req: ServiceRequest,
    credentials: BasicAuth,
    required: Option<Role>,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if let Some(role) = required {
                if user.role != role {
                    let message = match role {
                        Role::Admin => "Admin access required",
                        Role::Barber => "Barber access required",
                        Role::Client => "Client access required",
                    };
                    return Err((ErrorForbidden(message), req));
                }
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, None).await
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, Some(Role::Admin)).await
}

pub async fn barber_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, Some(Role::Barber)).await
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
