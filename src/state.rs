use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::models::{Appointment, AppointmentStatus, PaymentStatus};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<DomainEvent>,
    pub push: PushConfig,
}

impl AppState {
    pub fn new(db: SqlitePool, push: PushConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self { db, events, push }
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub fn publish(&self, event: DomainEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        !(self.public_key.trim().is_empty() || self.private_key.trim().is_empty())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AppointmentBooked,
    AppointmentStatusChanged,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::AppointmentBooked => "appointment_booked",
            EventKind::AppointmentStatusChanged => "appointment_status_changed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub appointment_id: String,
    pub barber_id: String,
    pub client_id: String,
    pub date: String,
    pub time: String,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub previous_status: Option<AppointmentStatus>,
}

impl DomainEvent {
    pub fn booked(appointment: &Appointment) -> Self {
        Self::from_appointment(EventKind::AppointmentBooked, appointment, None)
    }

    pub fn status_changed(appointment: &Appointment, previous: AppointmentStatus) -> Self {
        Self::from_appointment(EventKind::AppointmentStatusChanged, appointment, Some(previous))
    }

    fn from_appointment(
        kind: EventKind,
        appointment: &Appointment,
        previous_status: Option<AppointmentStatus>,
    ) -> Self {
        Self {
            kind,
            appointment_id: appointment.id.clone(),
            barber_id: appointment.barber_id.clone(),
            client_id: appointment.client_id.clone(),
            date: crate::models::format_date(appointment.date),
            time: crate::models::format_minute(appointment.time),
            status: appointment.status,
            payment_status: appointment.payment_status,
            previous_status,
        }
    }

    pub fn headline(&self) -> (&'static str, String) {
        match self.kind {
            EventKind::AppointmentBooked => (
                "Appointment request received",
                format!("Booked for {} at {}. We'll confirm shortly.", self.date, self.time),
            ),
            EventKind::AppointmentStatusChanged if self.previous_status == Some(self.status) => (
                "Payment received",
                format!("Payment is now {}.", self.payment_status.as_str()),
            ),
            EventKind::AppointmentStatusChanged => (
                "Appointment updated",
                format!("Status changed to {}.", self.status.as_str()),
            ),
        }
    }
}
