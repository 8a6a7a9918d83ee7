//! Client-driven alert status updates (acknowledge, respond, resolve,
//! cancel).

use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::alert::sos_transition_allowed;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::commands::PendingSosUpdates;
use crate::coordination::{broadcast_role, deliver_to_user};
use crate::events::{ClientEvent, SosStatusUpdate};
use crate::presence::{PresenceRegistry, Role};
use crate::store::AlertStoreResource;

pub fn sos_progress_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<DispatchClock>,
    mut pending: ResMut<PendingSosUpdates>,
    mut alerts: ResMut<AlertStoreResource>,
    presence: Res<PresenceRegistry>,
) {
    if event.0.kind != EventKind::SosProgress {
        return;
    }
    let Some(cmd) = pending.0.pop_front() else {
        return;
    };
    let Ok(alert) = alerts.get(cmd.alert) else {
        return;
    };
    // Stale guard: the alert may have escalated or been closed since submit.
    if !sos_transition_allowed(alert.status, cmd.to) {
        debug!(alert = ?cmd.alert, from = ?alert.status, to = ?cmd.to, "sos update no longer applicable");
        deliver_to_user(
            &presence,
            cmd.actor,
            ClientEvent::SosStatusUpdate(SosStatusUpdate {
                alert: alert.id,
                status: alert.status,
            }),
        );
        return;
    }

    match alerts.set_if(cmd.alert, alert.status, cmd.to, clock.now()) {
        Ok(updated) => {
            if updated.status.is_terminal() {
                clock.cancel_timer(EventKind::EscalationCheck, EventSubject::Alert(updated.id));
            }
            let event = ClientEvent::SosStatusUpdate(SosStatusUpdate {
                alert: updated.id,
                status: updated.status,
            });
            deliver_to_user(&presence, updated.user, event.clone());
            broadcast_role(&presence, Role::Admin, event);
        }
        Err(err) => debug!(alert = ?cmd.alert, %err, "sos update lost a race"),
    }
}
