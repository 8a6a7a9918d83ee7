//! Ride cancellation by either party, including the driver-cancel
//! reassignment path.

use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::commands::PendingCancellations;
use crate::config::CancellationConfig;
use crate::coordination::{deliver_to_ride, deliver_to_user, RideChannels};
use crate::events::{ClientEvent, RideCancelled, RideStatusUpdate};
use crate::presence::PresenceRegistry;
use crate::ride::{Cancellation, CancelledBy, Ride, RideId, RideStatus, UserId};
use crate::state_machine::{apply_transition, cancellation_charge};
use crate::store::{RideFields, RideStoreResource};
use crate::telemetry::DispatchTelemetry;

pub fn cancel_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<DispatchClock>,
    mut pending: ResMut<PendingCancellations>,
    mut store: ResMut<RideStoreResource>,
    mut presence: ResMut<PresenceRegistry>,
    mut channels: ResMut<RideChannels>,
    config: Res<CancellationConfig>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::CancelRequest {
        return;
    }
    let Some(cmd) = pending.0.pop_front() else {
        return;
    };
    let Ok(ride) = store.get(cmd.ride) else {
        return;
    };

    if ride.rider == cmd.actor {
        rider_cancel(
            &ride, &cmd.reason, &mut clock, &mut store, &mut presence, &mut channels, &config,
            &mut telemetry,
        );
    } else if ride.driver == Some(cmd.actor) {
        driver_cancel(
            &ride, cmd.actor, &cmd.reason, &mut clock, &mut store, &mut presence, &mut channels,
            &mut telemetry,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn rider_cancel(
    ride: &Ride,
    reason: &str,
    clock: &mut DispatchClock,
    store: &mut RideStoreResource,
    presence: &mut PresenceRegistry,
    channels: &mut RideChannels,
    config: &CancellationConfig,
    telemetry: &mut DispatchTelemetry,
) {
    // Stale guard: the ride may have started (or ended) since submit.
    let Ok(charge) = cancellation_charge(ride.status, ride.fare_estimate, config) else {
        debug!(ride = ?ride.id, status = ?ride.status, "rider cancel no longer applicable");
        return;
    };
    let cancellation = Cancellation {
        reason: reason.to_string(),
        charge,
    };
    match apply_transition(
        &mut **store,
        ride.id,
        ride.status,
        RideStatus::CancelledByRider,
        RideFields {
            cancellation: Some(cancellation.clone()),
            ..Default::default()
        },
        clock.now(),
    ) {
        Ok(cancelled) => {
            telemetry.rides_cancelled_by_rider += 1;
            settle_cancellation(
                &cancelled,
                CancelledBy::Rider,
                &cancellation,
                clock,
                presence,
                channels,
            );
        }
        Err(err) => debug!(ride = ?ride.id, %err, "rider cancel lost a race"),
    }
}

#[allow(clippy::too_many_arguments)]
fn driver_cancel(
    ride: &Ride,
    driver: UserId,
    reason: &str,
    clock: &mut DispatchClock,
    store: &mut RideStoreResource,
    presence: &mut PresenceRegistry,
    channels: &mut RideChannels,
    telemetry: &mut DispatchTelemetry,
) {
    match ride.status {
        // Before arrival the ride survives: back to search, this driver
        // excluded from the next fan-out round.
        RideStatus::DriverAssigned | RideStatus::DriverArriving => {
            match apply_transition(
                &mut **store,
                ride.id,
                ride.status,
                RideStatus::SearchingDriver,
                RideFields {
                    driver: Some(None),
                    exclude_driver: Some(driver),
                    ..Default::default()
                },
                clock.now(),
            ) {
                Ok(updated) => {
                    telemetry.rides_cancelled_by_driver += 1;
                    free_driver(presence, driver, ride.id);
                    channels.leave(ride.id, driver);
                    deliver_to_user(
                        presence,
                        driver,
                        ClientEvent::RideStatusUpdate(RideStatusUpdate {
                            ride: updated.id,
                            status: updated.status,
                            fare_actual: None,
                        }),
                    );
                    // Re-dispatch immediately; the request system re-arms the
                    // no-driver timer.
                    clock.schedule_now(
                        EventKind::RideRequested,
                        Some(EventSubject::Ride(updated.id)),
                    );
                }
                Err(err) => debug!(ride = ?ride.id, %err, "driver cancel lost a race"),
            }
        }
        // At the pickup point the ride dies; no charge to the rider.
        RideStatus::DriverArrived => {
            let cancellation = Cancellation {
                reason: reason.to_string(),
                charge: 0.0,
            };
            match apply_transition(
                &mut **store,
                ride.id,
                ride.status,
                RideStatus::CancelledByDriver,
                RideFields {
                    cancellation: Some(cancellation.clone()),
                    ..Default::default()
                },
                clock.now(),
            ) {
                Ok(cancelled) => {
                    telemetry.rides_cancelled_by_driver += 1;
                    settle_cancellation(
                        &cancelled,
                        CancelledBy::Driver,
                        &cancellation,
                        clock,
                        presence,
                        channels,
                    );
                }
                Err(err) => debug!(ride = ?ride.id, %err, "driver cancel lost a race"),
            }
        }
        _ => {
            debug!(ride = ?ride.id, status = ?ride.status, "driver cancel no longer applicable");
        }
    }
}

/// Terminal-cancellation side effects shared by both parties' paths.
fn settle_cancellation(
    ride: &Ride,
    cancelled_by: CancelledBy,
    cancellation: &Cancellation,
    clock: &mut DispatchClock,
    presence: &mut PresenceRegistry,
    channels: &mut RideChannels,
) {
    if let Some(driver) = ride.driver {
        free_driver(presence, driver, ride.id);
    }
    clock.cancel_timer(EventKind::MatchTimeout, EventSubject::Ride(ride.id));
    let event = ClientEvent::RideCancelled(RideCancelled {
        ride: ride.id,
        cancelled_by,
        reason: cancellation.reason.clone(),
        charge: cancellation.charge,
    });
    deliver_to_ride(presence, channels, ride.id, event.clone());
    // Rides cancelled before assignment have no channel yet; reach the rider
    // directly.
    if !channels.is_member(ride.id, ride.rider) {
        deliver_to_user(presence, ride.rider, event);
    }
    channels.remove(ride.id);
}

fn free_driver(presence: &mut PresenceRegistry, driver: UserId, ride: RideId) {
    if let Some(entry) = presence.get_mut(driver) {
        if entry.current_ride == Some(ride) {
            entry.current_ride = None;
        }
    }
}
