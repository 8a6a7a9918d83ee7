//! SOS fan-out: acknowledges the sender, reaches every target class, and
//! arms the escalation timer.

use bevy_ecs::prelude::{Res, ResMut};
use serde_json::json;
use tracing::{debug, warn};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject, ONE_SEC_MS};
use crate::config::EscalationConfig;
use crate::coordination::{broadcast_role, deliver_to_user};
use crate::events::{ClientEvent, SosAlertEvent, SosAlertSent};
use crate::notifier::{best_effort, NotifierResource};
use crate::presence::{PresenceRegistry, Role};
use crate::store::AlertStoreResource;
use crate::telemetry::DispatchTelemetry;

pub fn sos_trigger_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<DispatchClock>,
    alerts: Res<AlertStoreResource>,
    presence: Res<PresenceRegistry>,
    notifier: Res<NotifierResource>,
    config: Res<EscalationConfig>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::SosTrigger {
        return;
    }
    let Some(EventSubject::Alert(alert_id)) = event.0.subject else {
        return;
    };
    let Ok(alert) = alerts.get(alert_id) else {
        return;
    };

    telemetry.alerts_triggered += 1;
    debug!(alert = ?alert.id, user = ?alert.user, severity = ?alert.severity, "sos triggered");

    deliver_to_user(
        &presence,
        alert.user,
        ClientEvent::SosAlertSent(SosAlertSent { alert: alert.id }),
    );

    let fanout_event = ClientEvent::SosAlertEvent(SosAlertEvent {
        alert: alert.id,
        user: alert.user,
        location: alert.location,
        severity: alert.severity,
        ride: alert.ride,
    });
    let payload = json!({
        "alert": alert.id,
        "user": alert.user,
        "severity": alert.severity,
        "lat": alert.location.lat,
        "lng": alert.location.lng,
    });

    // Emergency contacts, over SMS/push only.
    if !alert.fanout.contact_numbers.is_empty() {
        best_effort(
            &mut telemetry,
            "sos_contacts",
            notifier.notify_contacts(
                &alert.fanout.contact_numbers,
                &format!(
                    "Emergency: one of your contacts triggered an SOS alert ({:?} severity)",
                    alert.severity
                ),
            ),
        );
    }

    // Nearby online drivers (rider-triggered alerts only; targets were
    // computed at trigger time).
    for driver in &alert.fanout.nearby_drivers {
        deliver_to_user(&presence, *driver, fanout_event.clone());
        best_effort(
            &mut telemetry,
            "sos_nearby_driver",
            notifier.notify_user(*driver, "sos_alert", &payload),
        );
    }

    // Admin broadcast channel.
    broadcast_role(&presence, Role::Admin, fanout_event.clone());
    best_effort(
        &mut telemetry,
        "sos_admin_broadcast",
        notifier.notify_broadcast(Role::Admin, "sos_alert", &payload),
    );

    // Counter-party of the associated ride, when it was active at trigger
    // time.
    if let Some(counterparty) = alert.fanout.counterparty {
        deliver_to_user(&presence, counterparty, fanout_event);
        best_effort(
            &mut telemetry,
            "sos_counterparty",
            notifier.notify_user(counterparty, "sos_alert", &payload),
        );
    }

    if alert.fanout.contact_numbers.is_empty() && alert.fanout.nearby_drivers.is_empty() {
        warn!(alert = ?alert.id, "sos fan-out reached no contacts or nearby drivers");
    }

    clock.schedule_timer_in(
        config.sla_secs * ONE_SEC_MS,
        EventKind::EscalationCheck,
        EventSubject::Alert(alert.id),
    );
}
