use std::{env, fs, path::Path, str::FromStr};

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    auth::{hash_password, new_id},
    config::Config,
    models::{ActivityRow, Role},
};

pub async fn connect(config: &Config) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    ensure_sqlite_dir(&config.database_url)?;

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    seed_admin(pool).await?;
    seed_barber(pool).await?;
    seed_services(pool).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    appointment_id: Option<&str>,
) {
    let _ = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, appointment_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(appointment_id)
    .execute(pool)
    .await;
}

pub async fn recent_activity(pool: &SqlitePool, limit: i64) -> Result<Vec<ActivityRow>, sqlx::Error> {
    sqlx::query_as::<_, ActivityRow>(
        "SELECT kind, message, created_at FROM activities ORDER BY created_at DESC, rowid DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    display_name: &str,
    role: Role,
    password: &str,
) -> Result<String, sqlx::Error> {
    let password_hash = hash_password(password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;
    let id = new_id();

    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(username)
    .bind(display_name)
    .bind(role.as_str())
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(id)
}

async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin.as_str())
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name =
        env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Shop Admin".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    insert_user(pool, &username, &display_name, Role::Admin, &password).await?;
    Ok(())
}

async fn seed_barber(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let barber_seed = env::var("SEED_BARBER").unwrap_or_else(|_| "false".to_string());
    if barber_seed != "true" {
        return Ok(());
    }

    let exists = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Barber.as_str())
        .fetch_optional(pool)
        .await?;
    if exists.is_some() {
        return Ok(());
    }

    let username = env::var("BARBER_USER").unwrap_or_else(|_| "barber1".to_string());
    let password = env::var("BARBER_PASSWORD").unwrap_or_else(|_| "change-me".to_string());
    let display_name =
        env::var("BARBER_DISPLAY_NAME").unwrap_or_else(|_| "Barber One".to_string());
    if password == "change-me" {
        log::warn!("BARBER_PASSWORD not set. Using default password 'change-me'. Set BARBER_PASSWORD in production.");
    }

    insert_user(pool, &username, &display_name, Role::Barber, &password).await?;
    Ok(())
}

async fn seed_services(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let catalog = [
        ("Signature Cut", "Precision cut, styling, and lineup.", 45, 3500),
        ("Fade & Line-Up", "Skin fade with sharp finishing touches.", 30, 3000),
        ("Beard Sculpt", "Shape, trim, and conditioning for the beard.", 30, 2000),
        ("Full Grooming", "Cut, beard, and grooming refresh.", 60, 5500),
    ];

    let now = Utc::now().to_rfc3339();
    for (name, description, duration, price) in catalog {
        sqlx::query(
            r#"INSERT INTO services (id, name, description, duration_minutes, price_cents, barber_id, active, created_at)
               VALUES (?, ?, ?, ?, ?, NULL, 1, ?)"#,
        )
        .bind(new_id())
        .bind(name)
        .bind(description)
        .bind(duration)
        .bind(price)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid sqlite url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("open in-memory sqlite");
    run_migrations(&pool).await.expect("migrations apply");
    pool
}

/// Inserts a user whose password cannot be used to log in.
#[cfg(test)]
pub async fn insert_test_user(pool: &SqlitePool, username: &str, role: Role) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, 'unusable', 1, ?)"#,
    )
    .bind(&id)
    .bind(username)
    .bind(username)
    .bind(role.as_str())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert user");
    id
}

#[cfg(test)]
pub async fn insert_service(
    pool: &SqlitePool,
    name: &str,
    duration_minutes: i64,
    barber_id: Option<&str>,
) -> String {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, name, description, duration_minutes, price_cents, barber_id, active, created_at)
           VALUES (?, ?, '', ?, 2500, ?, 1, ?)"#,
    )
    .bind(&id)
    .bind(name)
    .bind(duration_minutes)
    .bind(barber_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert service");
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_remote_urls_need_no_directory() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://localhost/db").is_ok());
    }

    #[test]
    fn creates_parent_directory_for_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("shop.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        ensure_sqlite_dir(&url).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }

    #[actix_web::test]
    async fn seeding_is_idempotent() {
        let pool = test_pool().await;
        seed_defaults(&pool).await.unwrap();
        seed_defaults(&pool).await.unwrap();

        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        let services: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(admins, 1);
        assert_eq!(services, 4);
    }

    #[actix_web::test]
    async fn activity_is_listed_newest_first() {
        let pool = test_pool().await;
        log_activity(&pool, "first", "one", None, None).await;
        log_activity(&pool, "second", "two", None, None).await;
        let rows = recent_activity(&pool, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "second");
    }
}
