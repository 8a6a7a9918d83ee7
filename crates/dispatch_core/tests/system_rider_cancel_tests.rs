mod support;

use dispatch_core::engine::DispatchEngine;
use dispatch_core::events::ClientEvent;
use dispatch_core::pricing::PricingConfig;
use dispatch_core::ride::{CancelledBy, RideStatus};
use dispatch_core::telemetry::DispatchTelemetry;

use support::world::{connect_economy_driver, connect_rider, economy_draft};

/// Flat pricing makes the estimate exactly 100, so the arrived-state charge
/// is easy to assert.
fn flat_100_engine() -> DispatchEngine {
    DispatchEngine::builder()
        .with_pricing_config(PricingConfig {
            base_fare: 100.0,
            per_km_rate: 0.0,
        })
        .build()
}

#[test]
fn cancelling_before_assignment_is_free() {
    let mut engine = flat_100_engine();
    let rider = connect_rider(&mut engine);

    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    engine
        .cancel_ride(rider.user, ride.id, "changed plans")
        .expect("cancel");
    engine.run_until_idle();

    let cancelled = engine.ride(ride.id).expect("ride");
    assert_eq!(cancelled.status, RideStatus::CancelledByRider);
    let cancellation = cancelled.cancellation.expect("cancellation record");
    assert_eq!(cancellation.charge, 0.0);
    assert_eq!(cancellation.reason, "changed plans");
}

#[test]
fn cancelling_after_driver_arrived_charges_the_configured_percentage() {
    let mut engine = flat_100_engine();
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
    for to in [RideStatus::DriverArriving, RideStatus::DriverArrived] {
        engine
            .ride_status_update(driver.user, ride.id, to, None)
            .expect("progress");
        engine.run_until_idle();
    }

    engine
        .cancel_ride(rider.user, ride.id, "taking the train")
        .expect("cancel");
    engine.run_until_idle();

    let cancelled = engine.ride(ride.id).expect("ride");
    assert_eq!(cancelled.status, RideStatus::CancelledByRider);
    let charge = cancelled.cancellation.expect("cancellation record").charge;
    assert!((charge - 10.0).abs() < 1e-9, "10% of the 100 estimate, got {charge}");

    // Both parties hear about it and the driver is freed.
    for client in [&rider, &driver] {
        assert!(client
            .sink
            .events()
            .iter()
            .any(|e| matches!(e, ClientEvent::RideCancelled(c) if c.cancelled_by == CancelledBy::Rider)));
    }
}

#[test]
fn cancelling_a_ride_in_progress_is_refused() {
    let mut engine = flat_100_engine();
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
    for to in [
        RideStatus::DriverArriving,
        RideStatus::DriverArrived,
        RideStatus::InProgress,
    ] {
        engine
            .ride_status_update(driver.user, ride.id, to, None)
            .expect("progress");
        engine.run_until_idle();
    }

    let err = engine
        .cancel_ride(rider.user, ride.id, "too late")
        .expect_err("in-progress rides cannot be cancelled");
    assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
    assert_eq!(engine.ride(ride.id).expect("ride").status, RideStatus::InProgress);
}

#[test]
fn driver_cancel_at_pickup_terminates_without_charging_the_rider() {
    let mut engine = flat_100_engine();
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
    for to in [RideStatus::DriverArriving, RideStatus::DriverArrived] {
        engine
            .ride_status_update(driver.user, ride.id, to, None)
            .expect("progress");
        engine.run_until_idle();
    }

    engine
        .cancel_ride(driver.user, ride.id, "rider unreachable")
        .expect("driver cancel");
    engine.run_until_idle();

    let cancelled = engine.ride(ride.id).expect("ride");
    assert_eq!(cancelled.status, RideStatus::CancelledByDriver);
    assert_eq!(cancelled.cancellation.expect("cancellation record").charge, 0.0);

    let telemetry = engine.world().resource::<DispatchTelemetry>();
    assert_eq!(telemetry.rides_cancelled_by_driver, 1);
}

#[test]
fn strangers_cannot_cancel_someone_elses_ride() {
    let mut engine = flat_100_engine();
    let rider = connect_rider(&mut engine);
    let stranger = connect_rider(&mut engine);

    let ride = engine
        .request_ride(rider.user, economy_draft())
        .expect("request ride");
    let err = engine
        .cancel_ride(stranger.user, ride.id, "not mine")
        .expect_err("stranger cancel");
    assert_eq!(err.code(), "AUTHORIZATION_ERROR");
}
