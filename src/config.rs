use std::env;

use crate::state::PushConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub push: PushConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/barberbook.db".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse().ok())
            .filter(|value: &u32| *value > 0)
            .unwrap_or(5);

        let push = PushConfig {
            public_key: env::var("VAPID_PUBLIC_KEY").unwrap_or_default(),
            private_key: env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
            subject: env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:bookings@example.com".to_string()),
        };

        Self {
            database_url,
            port,
            max_connections,
            push,
        }
    }
}
