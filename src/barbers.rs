use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    db::insert_user,
    error::{is_unique_violation, AppError, AppResult},
    models::{Barber, BarberRow, Role},
};

#[derive(Debug, Deserialize)]
pub struct NewBarber {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

pub async fn find(conn: &mut SqliteConnection, barber_id: &str) -> AppResult<Option<BarberRow>> {
    let row = sqlx::query_as::<_, BarberRow>(
        "SELECT id, username, display_name, active FROM users WHERE id = ? AND role = ?",
    )
    .bind(barber_id)
    .bind(Role::Barber.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn get(pool: &SqlitePool, barber_id: &str) -> AppResult<Barber> {
    let mut conn = pool.acquire().await?;
    find(&mut conn, barber_id)
        .await?
        .map(Barber::from)
        .ok_or_else(|| AppError::not_found("Barber not found"))
}

/// Active barbers only, as shown to clients.
pub async fn list_active(pool: &SqlitePool) -> AppResult<Vec<Barber>> {
    let rows = sqlx::query_as::<_, BarberRow>(
        r#"SELECT id, username, display_name, active
           FROM users
           WHERE role = ? AND active = 1
           ORDER BY display_name"#,
    )
    .bind(Role::Barber.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Barber::from).collect())
}

pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<Barber>> {
    let rows = sqlx::query_as::<_, BarberRow>(
        "SELECT id, username, display_name, active FROM users WHERE role = ? ORDER BY display_name",
    )
    .bind(Role::Barber.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Barber::from).collect())
}

pub async fn create(pool: &SqlitePool, input: NewBarber) -> AppResult<Barber> {
    let username = input.username.trim();
    let display_name = input.display_name.trim();
    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push("Username is required.");
    }
    if display_name.is_empty() {
        errors.push("Display name is required.");
    }
    if input.password.len() < 8 {
        errors.push("Password must be at least 8 characters.");
    }
    if !errors.is_empty() {
        return Err(AppError::validation(errors.join(" ")));
    }

    let id = insert_user(pool, username, display_name, Role::Barber, &input.password)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::validation("Username already exists.")
            } else {
                AppError::Database(err)
            }
        })?;

    get(pool, &id).await
}

/// Inactive barbers keep their history but disappear from booking.
pub async fn set_active(pool: &SqlitePool, barber_id: &str, active: bool) -> AppResult<Barber> {
    let result = sqlx::query("UPDATE users SET active = ? WHERE id = ? AND role = ?")
        .bind(i64::from(active))
        .bind(barber_id)
        .bind(Role::Barber.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Barber not found"));
    }
    log::info!(
        "Barber {barber_id} {}",
        if active { "activated" } else { "deactivated" }
    );
    get(pool, barber_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_barber(username: &str) -> NewBarber {
        NewBarber {
            username: username.to_string(),
            display_name: "Sam Fade".to_string(),
            password: "long-enough".to_string(),
        }
    }

    #[actix_web::test]
    async fn creates_and_lists_barbers() {
        let pool = test_pool().await;
        let barber = create(&pool, new_barber("sam")).await.unwrap();
        assert_eq!(barber.initials, "SF");
        assert!(barber.active);

        let listed = list_active(&pool).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, barber.id);
    }

    #[actix_web::test]
    async fn rejects_duplicate_usernames_and_weak_passwords() {
        let pool = test_pool().await;
        create(&pool, new_barber("sam")).await.unwrap();
        let err = create(&pool, new_barber("sam")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create(
            &pool,
            NewBarber {
                password: "short".to_string(),
                ..new_barber("alex")
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[actix_web::test]
    async fn deactivated_barbers_are_hidden_but_kept() {
        let pool = test_pool().await;
        let barber = create(&pool, new_barber("sam")).await.unwrap();
        let updated = set_active(&pool, &barber.id, false).await.unwrap();
        assert!(!updated.active);
        assert!(list_active(&pool).await.unwrap().is_empty());
        assert_eq!(list_all(&pool).await.unwrap().len(), 1);

        let err = set_active(&pool, "missing", true).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
