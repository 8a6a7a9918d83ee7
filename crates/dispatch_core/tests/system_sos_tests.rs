mod support;

use dispatch_core::alert::{SosDraft, SosSeverity, SosStatus};
use dispatch_core::clock::{DispatchClock, EventKind, EventSubject, ONE_SEC_MS};
use dispatch_core::config::EscalationConfig;
use dispatch_core::contacts::EmergencyContact;
use dispatch_core::engine::DispatchEngine;
use dispatch_core::events::ClientEvent;
use dispatch_core::telemetry::DispatchTelemetry;
use dispatch_core::test_helpers::{NotifierCall, RecordingNotifier};

use support::world::{
    connect_admin, connect_driver_at, connect_economy_driver, connect_rider, economy_draft, point,
    BASE,
};

const FIVE_MIN_MS: u64 = 5 * 60 * ONE_SEC_MS;

fn sos_draft() -> SosDraft {
    SosDraft {
        location: BASE,
        severity: SosSeverity::High,
        ride: None,
    }
}

#[test]
fn trigger_reaches_every_target_class() {
    let notifier = RecordingNotifier::new();
    let calls = notifier.calls_handle();
    let mut engine = DispatchEngine::builder()
        .with_notifier(Box::new(notifier))
        .build();

    let rider = connect_rider(&mut engine);
    let admin = connect_admin(&mut engine);
    let near_driver = connect_economy_driver(&mut engine);
    // ~22 km away, outside the 5 km alert radius.
    let far_driver = connect_driver_at(
        &mut engine,
        dispatch_core::ride::VehicleType::Economy,
        point(0.2, 0.0),
    );

    engine
        .set_emergency_contacts(
            rider.user,
            vec![
                EmergencyContact {
                    name: "Ana".into(),
                    number: "+491701".into(),
                    notifications_enabled: true,
                },
                EmergencyContact {
                    name: "Ben".into(),
                    number: "+491702".into(),
                    notifications_enabled: false,
                },
            ],
        )
        .expect("contacts");

    // Mid-ride alert: the assigned driver is the counter-party.
    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    engine.run_until_idle();
    engine
        .driver_response(near_driver.user, ride.id, true)
        .expect("accept");
    engine.run_until_idle();
    near_driver.sink.take();

    let alert = engine
        .trigger_sos(
            rider.user,
            SosDraft {
                ride: Some(ride.id),
                ..sos_draft()
            },
        )
        .expect("trigger sos");
    engine.run_until_idle();

    // Sender ack.
    assert!(rider
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, ClientEvent::SosAlertSent(s) if s.alert == alert.id)));

    // Only the opted-in contact number is handed to the notifier.
    let recorded = calls.lock().expect("calls");
    assert!(recorded.iter().any(|call| matches!(
        call,
        NotifierCall::Contacts { numbers, .. } if numbers == &vec!["+491701".to_string()]
    )));
    drop(recorded);

    // Admin broadcast and counter-party delivery.
    assert!(admin
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, ClientEvent::SosAlertEvent(a) if a.alert == alert.id)));
    assert!(near_driver
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, ClientEvent::SosAlertEvent(a) if a.alert == alert.id)));
    assert!(!far_driver
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, ClientEvent::SosAlertEvent(_))));

    let stored = engine.alert(alert.id).expect("alert");
    assert_eq!(stored.status, SosStatus::Active);
    assert_eq!(stored.fanout.contact_numbers, vec!["+491701".to_string()]);
    assert_eq!(stored.fanout.counterparty, Some(near_driver.user));
}

#[test]
fn triggering_twice_creates_two_alerts() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);

    let first = engine.trigger_sos(rider.user, sos_draft()).expect("first");
    let second = engine.trigger_sos(rider.user, sos_draft()).expect("second");
    engine.run_until_idle();

    assert_ne!(first.id, second.id);
    assert_eq!(
        engine.world().resource::<DispatchTelemetry>().alerts_triggered,
        2
    );
}

#[test]
fn open_alert_escalates_exactly_once_past_the_sla() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);
    let admin = connect_admin(&mut engine);

    let alert = engine.trigger_sos(rider.user, sos_draft()).expect("trigger");
    engine.run_until_idle();

    engine.advance_to(FIVE_MIN_MS + ONE_SEC_MS);

    let escalated = engine.alert(alert.id).expect("alert");
    assert_eq!(escalated.status, SosStatus::Escalated);
    assert_eq!(escalated.escalated_at, Some(FIVE_MIN_MS));

    // A second sweep against the same alert is a silent no-op.
    engine
        .world_mut()
        .resource_mut::<DispatchClock>()
        .schedule_timer_in(ONE_SEC_MS, EventKind::EscalationCheck, EventSubject::Alert(alert.id));
    engine.advance_to(FIVE_MIN_MS + 3 * ONE_SEC_MS);

    let telemetry = engine.world().resource::<DispatchTelemetry>();
    assert_eq!(telemetry.alerts_escalated, 1);
    assert!(telemetry.stale_timers_dropped >= 1);
    assert_eq!(
        admin
            .sink
            .events()
            .iter()
            .filter(|e| matches!(e, ClientEvent::SosStatusUpdate(u) if u.status == SosStatus::Escalated))
            .count(),
        1
    );
}

#[test]
fn responding_alert_does_not_escalate() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);
    let admin = connect_admin(&mut engine);

    let alert = engine.trigger_sos(rider.user, sos_draft()).expect("trigger");
    engine.run_until_idle();

    engine
        .update_sos(admin.user, alert.id, SosStatus::Acknowledged)
        .expect("ack");
    engine.run_until_idle();
    engine
        .update_sos(admin.user, alert.id, SosStatus::Responding)
        .expect("respond");
    engine.run_until_idle();

    engine.advance_to(FIVE_MIN_MS + ONE_SEC_MS);
    assert_eq!(
        engine.alert(alert.id).expect("alert").status,
        SosStatus::Responding
    );
    assert_eq!(
        engine.world().resource::<DispatchTelemetry>().alerts_escalated,
        0
    );
}

#[test]
fn acknowledged_alert_still_escalates() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);
    let admin = connect_admin(&mut engine);

    let alert = engine.trigger_sos(rider.user, sos_draft()).expect("trigger");
    engine.run_until_idle();
    engine
        .update_sos(admin.user, alert.id, SosStatus::Acknowledged)
        .expect("ack");
    engine.run_until_idle();

    engine.advance_to(FIVE_MIN_MS + ONE_SEC_MS);
    assert_eq!(
        engine.alert(alert.id).expect("alert").status,
        SosStatus::Escalated
    );
}

#[test]
fn only_the_triggering_user_cancels_and_only_while_open() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);
    let other = connect_rider(&mut engine);

    let alert = engine.trigger_sos(rider.user, sos_draft()).expect("trigger");
    engine.run_until_idle();

    let err = engine
        .update_sos(other.user, alert.id, SosStatus::Cancelled)
        .expect_err("stranger cancel");
    assert_eq!(err.code(), "AUTHORIZATION_ERROR");

    engine
        .update_sos(rider.user, alert.id, SosStatus::Cancelled)
        .expect("owner cancel");
    engine.run_until_idle();
    assert_eq!(
        engine.alert(alert.id).expect("alert").status,
        SosStatus::Cancelled
    );

    // Terminal: the SLA timer is disarmed, nothing escalates later.
    engine.advance_to(FIVE_MIN_MS + ONE_SEC_MS);
    assert_eq!(
        engine.alert(alert.id).expect("alert").status,
        SosStatus::Cancelled
    );
}

#[test]
fn sla_is_configuration_not_policy() {
    let mut engine = DispatchEngine::builder()
        .with_escalation_config(EscalationConfig::default().with_sla_secs(60))
        .build();
    let rider = connect_rider(&mut engine);

    let alert = engine.trigger_sos(rider.user, sos_draft()).expect("trigger");
    engine.run_until_idle();

    engine.advance_to(59 * ONE_SEC_MS);
    assert_eq!(engine.alert(alert.id).expect("alert").status, SosStatus::Active);
    engine.advance_to(61 * ONE_SEC_MS);
    assert_eq!(
        engine.alert(alert.id).expect("alert").status,
        SosStatus::Escalated
    );
}

#[test]
fn notifier_failures_never_fail_the_trigger() {
    let notifier = RecordingNotifier::failing();
    let mut engine = DispatchEngine::builder()
        .with_notifier(Box::new(notifier))
        .build();
    let rider = connect_rider(&mut engine);
    engine
        .set_emergency_contacts(
            rider.user,
            vec![EmergencyContact {
                name: "Ana".into(),
                number: "+491701".into(),
                notifications_enabled: true,
            }],
        )
        .expect("contacts");

    let alert = engine.trigger_sos(rider.user, sos_draft()).expect("trigger succeeds");
    engine.run_until_idle();

    assert_eq!(engine.alert(alert.id).expect("alert").status, SosStatus::Active);
    assert!(
        engine.world().resource::<DispatchTelemetry>().notifier_failures > 0,
        "failures are counted, not propagated"
    );
}
