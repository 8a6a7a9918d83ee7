//! SLA sweep: escalates an alert still open when its timer fires.

use bevy_ecs::prelude::{Res, ResMut};
use serde_json::json;
use tracing::{debug, warn};

use crate::alert::SosStatus;
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::coordination::{broadcast_role, deliver_to_user};
use crate::events::{ClientEvent, SosStatusUpdate};
use crate::notifier::{best_effort, NotifierResource};
use crate::presence::{PresenceRegistry, Role};
use crate::store::AlertStoreResource;
use crate::telemetry::DispatchTelemetry;

pub fn escalation_check_system(
    event: Res<CurrentEvent>,
    clock: Res<DispatchClock>,
    mut alerts: ResMut<AlertStoreResource>,
    presence: Res<PresenceRegistry>,
    notifier: Res<NotifierResource>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::EscalationCheck {
        return;
    }
    let Some(EventSubject::Alert(alert_id)) = event.0.subject else {
        return;
    };
    let Ok(alert) = alerts.get(alert_id) else {
        return;
    };

    // Stale-timer guard: only alerts still without a responder escalate.
    if !matches!(alert.status, SosStatus::Active | SosStatus::Acknowledged) {
        telemetry.stale_timers_dropped += 1;
        return;
    }

    match alerts.set_if(alert_id, alert.status, SosStatus::Escalated, clock.now()) {
        Ok(escalated) => {
            telemetry.alerts_escalated += 1;
            warn!(alert = ?alert_id, "sos alert escalated after SLA");
            let event = ClientEvent::SosStatusUpdate(SosStatusUpdate {
                alert: escalated.id,
                status: escalated.status,
            });
            deliver_to_user(&presence, escalated.user, event.clone());
            broadcast_role(&presence, Role::Admin, event);
            best_effort(
                &mut telemetry,
                "sos_escalation",
                notifier.notify_broadcast(
                    Role::Admin,
                    "sos_escalated",
                    &json!({ "alert": escalated.id, "user": escalated.user }),
                ),
            );
        }
        Err(err) => {
            // Concurrent update won; the sweep applies at most once.
            debug!(alert = ?alert_id, %err, "escalation dropped after losing a race");
            telemetry.stale_timers_dropped += 1;
        }
    }
}
