use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast::{self, error::RecvError};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::{
    auth::new_id,
    error::{AppError, AppResult},
    state::{DomainEvent, PushConfig},
};

#[derive(Debug, Deserialize)]
pub struct PushSubscriptionInput {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PushSubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
}

pub async fn store_subscription(
    pool: &SqlitePool,
    appointment_id: &str,
    subscription: PushSubscriptionInput,
) -> AppResult<()> {
    if subscription.endpoint.trim().is_empty()
        || subscription.keys.p256dh.trim().is_empty()
        || subscription.keys.auth.trim().is_empty()
    {
        return Err(AppError::validation("Push subscription is incomplete."));
    }

    sqlx::query(
        r#"INSERT INTO push_subscriptions (id, appointment_id, endpoint, p256dh, auth, created_at)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(appointment_id, endpoint) DO UPDATE SET
             p256dh = excluded.p256dh,
             auth = excluded.auth"#,
    )
    .bind(new_id())
    .bind(appointment_id)
    .bind(subscription.endpoint)
    .bind(subscription.keys.p256dh)
    .bind(subscription.keys.auth)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delivers domain events as web-push messages until the channel closes.
/// Delivery runs after the booking or transition has committed, so failures
/// here are only logged.
pub async fn run_dispatcher(
    pool: SqlitePool,
    config: PushConfig,
    mut events: broadcast::Receiver<DomainEvent>,
) {
    if !config.enabled() {
        log::info!("Web push disabled: VAPID keys not configured");
        return;
    }

    loop {
        match events.recv().await {
            Ok(event) => notify_appointment(&pool, &config, &event).await,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Push dispatcher lagged, skipped {skipped} events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn notify_appointment(pool: &SqlitePool, config: &PushConfig, event: &DomainEvent) {
    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT endpoint, p256dh, auth FROM push_subscriptions WHERE appointment_id = ?",
    )
    .bind(&event.appointment_id)
    .fetch_all(pool)
    .await
    .unwrap_or_default();

    if rows.is_empty() {
        return;
    }

    let payload = push_payload(event);
    for row in rows {
        if let Err(err) = send_push(config, row, &payload).await {
            log::warn!("Push send failed: {err}");
        }
    }
}

fn push_payload(event: &DomainEvent) -> String {
    let (title, body) = event.headline();
    serde_json::json!({
        "title": title,
        "body": body,
        "url": format!("/appointments/{}", event.appointment_id),
    })
    .to_string()
}

async fn send_push(
    config: &PushConfig,
    row: PushSubscriptionRow,
    payload: &str,
) -> Result<(), WebPushError> {
    let subscription = SubscriptionInfo::new(row.endpoint, row.p256dh, row.auth);
    let mut builder = WebPushMessageBuilder::new(&subscription);
    builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());

    let mut vapid_builder =
        VapidSignatureBuilder::from_base64(&config.private_key, URL_SAFE_NO_PAD, &subscription)?;
    vapid_builder.add_claim("sub", config.subject.clone());

    builder.set_vapid_signature(vapid_builder.build()?);

    let client = IsahcWebPushClient::new()?;
    client.send(builder.build()?).await?;
    Ok(())
}
