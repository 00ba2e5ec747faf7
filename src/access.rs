//! Single capability check for every state-mutating operation.

use crate::{
    auth::Principal,
    error::{AppError, AppResult},
    lifecycle::StatusAction,
    models::{AppointmentStatus, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Book,
    ViewAppointment,
    Transition(StatusAction),
    ManageAvailability,
    ViewSchedule,
    ManageCatalog,
    ManageSettings,
    ManageBarbers,
}

#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Shop,
    Barber(&'a str),
    Booking {
        barber_id: &'a str,
        client_id: &'a str,
    },
    Appointment {
        barber_id: &'a str,
        client_id: &'a str,
        status: AppointmentStatus,
    },
}

pub fn can(principal: &Principal, action: Action, resource: Resource<'_>) -> bool {
    if principal.role == Role::Admin {
        return true;
    }

    let is_self = |id: &str| principal.id == id;
    match (principal.role, action, resource) {
        (Role::Client, Action::Book, Resource::Booking { client_id, .. }) => is_self(client_id),
        (Role::Barber, Action::Book, Resource::Booking { barber_id, .. }) => is_self(barber_id),

        (Role::Client, Action::ViewAppointment, Resource::Appointment { client_id, .. }) => {
            is_self(client_id)
        }
        (Role::Barber, Action::ViewAppointment, Resource::Appointment { barber_id, .. }) => {
            is_self(barber_id)
        }

        // Clients may only withdraw a request the barber has not confirmed yet.
        (
            Role::Client,
            Action::Transition(StatusAction::Cancel),
            Resource::Appointment {
                client_id, status, ..
            },
        ) => is_self(client_id) && status != AppointmentStatus::Confirmed,
        (Role::Barber, Action::Transition(_), Resource::Appointment { barber_id, .. }) => {
            is_self(barber_id)
        }

        (Role::Barber, Action::ManageAvailability | Action::ViewSchedule, Resource::Barber(id)) => {
            is_self(id)
        }

        _ => false,
    }
}

pub fn authorize(principal: &Principal, action: Action, resource: Resource<'_>) -> AppResult<()> {
    if can(principal, action, resource) {
        Ok(())
    } else {
        log::warn!(
            "Denied {:?} on {:?} for {} ({})",
            action,
            resource,
            principal.id,
            principal.role.as_str()
        );
        Err(AppError::unauthorized("You are not allowed to do that."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(id: &str, role: Role) -> Principal {
        Principal {
            id: id.to_string(),
            display_name: id.to_string(),
            role,
        }
    }

    fn appointment(status: AppointmentStatus) -> Resource<'static> {
        Resource::Appointment {
            barber_id: "barber-1",
            client_id: "client-1",
            status,
        }
    }

    #[test]
    fn admin_can_do_anything() {
        let admin = principal("admin", Role::Admin);
        assert!(can(&admin, Action::ManageSettings, Resource::Shop));
        assert!(can(
            &admin,
            Action::Transition(StatusAction::MarkPaid),
            appointment(AppointmentStatus::Completed)
        ));
    }

    #[test]
    fn clients_book_only_for_themselves() {
        let client = principal("client-1", Role::Client);
        let own = Resource::Booking {
            barber_id: "barber-1",
            client_id: "client-1",
        };
        let other = Resource::Booking {
            barber_id: "barber-1",
            client_id: "client-2",
        };
        assert!(can(&client, Action::Book, own));
        assert!(!can(&client, Action::Book, other));
    }

    #[test]
    fn client_cancel_only_while_pending() {
        let client = principal("client-1", Role::Client);
        let cancel = Action::Transition(StatusAction::Cancel);
        assert!(can(&client, cancel, appointment(AppointmentStatus::Pending)));
        assert!(!can(&client, cancel, appointment(AppointmentStatus::Confirmed)));
        assert!(!can(
            &client,
            Action::Transition(StatusAction::Confirm),
            appointment(AppointmentStatus::Pending)
        ));
        assert!(!can(
            &principal("client-2", Role::Client),
            cancel,
            appointment(AppointmentStatus::Pending)
        ));
    }

    #[test]
    fn barbers_act_on_their_own_book_only() {
        let barber = principal("barber-1", Role::Barber);
        let stranger = principal("barber-2", Role::Barber);
        let confirm = Action::Transition(StatusAction::Confirm);
        assert!(can(&barber, confirm, appointment(AppointmentStatus::Pending)));
        assert!(!can(&stranger, confirm, appointment(AppointmentStatus::Pending)));
        assert!(can(&barber, Action::ManageAvailability, Resource::Barber("barber-1")));
        assert!(!can(&barber, Action::ManageAvailability, Resource::Barber("barber-2")));
        assert!(!can(&barber, Action::ManageCatalog, Resource::Shop));
    }

    #[test]
    fn denial_is_unauthorized_error() {
        let client = principal("client-1", Role::Client);
        let err = authorize(&client, Action::ManageBarbers, Resource::Shop).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
