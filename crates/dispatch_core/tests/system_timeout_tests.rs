mod support;

use dispatch_core::clock::ONE_SEC_MS;
use dispatch_core::config::MatchingConfig;
use dispatch_core::engine::DispatchEngine;
use dispatch_core::events::ClientEvent;
use dispatch_core::ride::RideStatus;
use dispatch_core::telemetry::DispatchTelemetry;

use support::world::{connect_economy_driver, connect_rider, economy_draft};

#[test]
fn unassigned_ride_is_cancelled_by_the_system_after_the_window() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);

    // No drivers connected at all.
    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    engine.run_until_idle();
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::SearchingDriver
    );

    engine.advance_to(30 * ONE_SEC_MS + ONE_SEC_MS);

    let cancelled = engine.ride(ride.id).expect("ride");
    assert_eq!(cancelled.status, RideStatus::CancelledBySystem);
    let cancellation = cancelled.cancellation.expect("cancellation record");
    assert_eq!(cancellation.reason, "no drivers available");
    assert_eq!(cancellation.charge, 0.0);

    assert!(rider
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, ClientEvent::RideCancelled(c) if c.reason == "no drivers available")));
    assert_eq!(
        engine
            .world()
            .resource::<DispatchTelemetry>()
            .rides_cancelled_no_driver,
        1
    );
}

#[test]
fn assignment_before_the_window_disarms_the_timer() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);
    let driver = connect_economy_driver(&mut engine);

    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    engine.run_until_idle();

    engine.advance_to(5 * ONE_SEC_MS);
    engine
        .driver_response(driver.user, ride.id, true)
        .expect("accept");
    engine.run_until_idle();
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::DriverAssigned
    );

    // Well past the original window: the assigned ride must survive.
    engine.advance_to(120 * ONE_SEC_MS);
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::DriverAssigned
    );
    assert_eq!(
        engine
            .world()
            .resource::<DispatchTelemetry>()
            .rides_cancelled_no_driver,
        0
    );
}

#[test]
fn the_window_is_configuration_not_policy() {
    let mut engine = DispatchEngine::builder()
        .with_matching_config(MatchingConfig::default().with_offer_timeout_secs(5))
        .build();
    let rider = connect_rider(&mut engine);

    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    engine.run_until_idle();

    engine.advance_to(4 * ONE_SEC_MS);
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::SearchingDriver
    );

    engine.advance_to(6 * ONE_SEC_MS);
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::CancelledBySystem
    );
}

#[test]
fn requeued_ride_gets_a_fresh_window() {
    let mut engine = DispatchEngine::new();
    let rider = connect_rider(&mut engine);
    let driver = connect_economy_driver(&mut engine);

    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    engine.run_until_idle();
    engine
        .driver_response(driver.user, ride.id, true)
        .expect("accept");
    engine.run_until_idle();

    // Driver cancels at t=20s; the ride returns to search with a fresh 30s
    // window, so it must still be alive at t=35s and dead after t=50s.
    engine.advance_to(20 * ONE_SEC_MS);
    engine
        .cancel_ride(driver.user, ride.id, "vehicle problem")
        .expect("driver cancel");
    engine.run_until_idle();
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::SearchingDriver
    );

    engine.advance_to(35 * ONE_SEC_MS);
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::SearchingDriver
    );

    engine.advance_to(51 * ONE_SEC_MS);
    assert_eq!(
        engine.ride(ride.id).expect("ride").status,
        RideStatus::CancelledBySystem
    );
}
