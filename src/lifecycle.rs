//! Appointment lifecycle.
//!
//! ```text
//! PENDING ──confirm──▶ CONFIRMED ──complete──▶ COMPLETED ──mark_paid──▶ COMPLETED + PAID
//!    │                     │
//!    └──cancel──▶ CANCELLED ◀──cancel──┘
//! ```
//!
//! CANCELLED and COMPLETED + PAID are terminal.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    access::{authorize, Action, Resource},
    auth::Principal,
    error::{AppError, AppResult},
    ledger,
    models::{Appointment, AppointmentStatus, PaymentStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Confirm,
    Cancel,
    Complete,
    MarkPaid,
}

impl StatusAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusAction::Confirm => "confirm",
            StatusAction::Cancel => "cancel",
            StatusAction::Complete => "complete",
            StatusAction::MarkPaid => "mark_paid",
        }
    }
}

pub type State = (AppointmentStatus, PaymentStatus);

pub fn is_terminal(state: State) -> bool {
    matches!(
        state,
        (AppointmentStatus::Cancelled, _) | (AppointmentStatus::Completed, PaymentStatus::Paid)
    )
}

/// The state `action` leads to from `current`, or `InvalidTransition`.
pub fn next_state(current: State, action: StatusAction) -> AppResult<State> {
    use AppointmentStatus::*;
    use PaymentStatus::*;

    if is_terminal(current) {
        return Err(AppError::InvalidTransition(format!(
            "Appointment is already {} / {}.",
            current.0.as_str(),
            current.1.as_str()
        )));
    }

    let next = match (current, action) {
        ((Pending, Unpaid), StatusAction::Confirm) => (Confirmed, Unpaid),
        ((Pending, Unpaid), StatusAction::Cancel) => (Cancelled, Unpaid),
        ((Confirmed, Unpaid), StatusAction::Complete) => (Completed, Unpaid),
        ((Confirmed, Unpaid), StatusAction::Cancel) => (Cancelled, Unpaid),
        ((Completed, Unpaid), StatusAction::MarkPaid) => (Completed, Paid),
        ((status, payment), action) => {
            return Err(AppError::InvalidTransition(format!(
                "Cannot {} an appointment that is {} / {}.",
                action.as_str().replace('_', " "),
                status.as_str(),
                payment.as_str()
            )))
        }
    };
    Ok(next)
}

/// Loads the appointment, checks the caller may act on it, and applies the
/// transition against the state that was read.
pub async fn apply(
    pool: &SqlitePool,
    principal: &Principal,
    appointment_id: &str,
    action: StatusAction,
) -> AppResult<(Appointment, AppointmentStatus)> {
    let current = ledger::get(pool, appointment_id).await?;
    authorize(
        principal,
        Action::Transition(action),
        Resource::Appointment {
            barber_id: &current.barber_id,
            client_id: &current.client_id,
            status: current.status,
        },
    )?;

    let from = (current.status, current.payment_status);
    let to = next_state(from, action)?;
    let updated = ledger::update_status(pool, appointment_id, from, to).await?;

    log::info!(
        "Appointment {appointment_id}: {} by {} ({} -> {})",
        action.as_str(),
        principal.id,
        from.0.as_str(),
        updated.status.as_str()
    );
    Ok((updated, current.status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;
    use PaymentStatus::*;

    const ALL_ACTIONS: [StatusAction; 4] = [
        StatusAction::Confirm,
        StatusAction::Cancel,
        StatusAction::Complete,
        StatusAction::MarkPaid,
    ];

    #[test]
    fn happy_path_reaches_paid() {
        let confirmed = next_state((Pending, Unpaid), StatusAction::Confirm).unwrap();
        let completed = next_state(confirmed, StatusAction::Complete).unwrap();
        let paid = next_state(completed, StatusAction::MarkPaid).unwrap();
        assert_eq!(paid, (Completed, Paid));
        assert!(is_terminal(paid));
    }

    #[test]
    fn cancel_is_reachable_from_pending_and_confirmed_only() {
        assert_eq!(
            next_state((Pending, Unpaid), StatusAction::Cancel).unwrap(),
            (Cancelled, Unpaid)
        );
        assert_eq!(
            next_state((Confirmed, Unpaid), StatusAction::Cancel).unwrap(),
            (Cancelled, Unpaid)
        );
        assert!(next_state((Completed, Unpaid), StatusAction::Cancel).is_err());
    }

    #[test]
    fn terminal_states_reject_everything() {
        for state in [(Cancelled, Unpaid), (Completed, Paid)] {
            for action in ALL_ACTIONS {
                let err = next_state(state, action).unwrap_err();
                assert!(matches!(err, AppError::InvalidTransition(_)));
            }
        }
    }

    #[test]
    fn paid_requires_completed() {
        for state in [(Pending, Unpaid), (Confirmed, Unpaid)] {
            let err = next_state(state, StatusAction::MarkPaid).unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition(_)));
        }
    }

    #[test]
    fn status_never_moves_backwards() {
        assert!(next_state((Confirmed, Unpaid), StatusAction::Confirm).is_err());
        assert!(next_state((Completed, Unpaid), StatusAction::Complete).is_err());
        assert!(next_state((Pending, Unpaid), StatusAction::Complete).is_err());
    }

    #[test]
    fn actions_deserialize_from_snake_case() {
        let action: StatusAction = serde_json::from_str("\"mark_paid\"").unwrap();
        assert_eq!(action, StatusAction::MarkPaid);
    }
}
