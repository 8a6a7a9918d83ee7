//! Driver accept/reject handling with the at-most-one-driver guarantee.
//!
//! An accept is a single conditional update keyed on the ride still being in
//! `searching_driver` with no driver attached; every concurrent accept after
//! the first loses the race at the store and gets a non-alarming
//! `ride_unavailable` signal.

use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::commands::PendingDriverResponses;
use crate::coordination::{deliver_to_user, RideChannels};
use crate::error::DispatchError;
use crate::events::{ClientEvent, DriverAssigned, RideAssigned, RideUnavailable};
use crate::presence::{PresenceRegistry, Role};
use crate::ride::RideStatus;
use crate::spatial::LocationCache;
use crate::state_machine::apply_transition;
use crate::store::{RideFields, RideStoreResource};
use crate::telemetry::DispatchTelemetry;

pub fn driver_response_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<DispatchClock>,
    mut pending: ResMut<PendingDriverResponses>,
    mut store: ResMut<RideStoreResource>,
    mut presence: ResMut<PresenceRegistry>,
    location: Res<LocationCache>,
    mut channels: ResMut<RideChannels>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::DriverResponse {
        return;
    }
    let Some(cmd) = pending.0.pop_front() else {
        return;
    };
    if !cmd.accept {
        // A rejection is final for this driver only; the ride-level fallback
        // is the no-driver timer.
        debug!(ride = ?cmd.ride, driver = ?cmd.driver, "driver rejected offer");
        return;
    }

    let now = clock.now();

    // The driver must still be connected, free, and not excluded from this
    // ride; anything else turns the accept into a stale offer.
    let driver_free = presence
        .get(cmd.driver)
        .map(|entry| entry.role == Role::Driver && entry.current_ride.is_none())
        .unwrap_or(false);
    let excluded = store
        .get(cmd.ride)
        .map(|ride| ride.excluded_drivers.contains(&cmd.driver))
        .unwrap_or(true);
    if !driver_free || excluded {
        telemetry.accept_conflicts += 1;
        deliver_to_user(
            &presence,
            cmd.driver,
            ClientEvent::RideUnavailable(RideUnavailable { ride: cmd.ride }),
        );
        return;
    }

    match apply_transition(
        &mut **store,
        cmd.ride,
        RideStatus::SearchingDriver,
        RideStatus::DriverAssigned,
        RideFields {
            driver: Some(Some(cmd.driver)),
            ..Default::default()
        },
        now,
    ) {
        Ok(ride) => {
            // Winner: mark the driver busy and disarm the no-driver timer.
            if let Some(entry) = presence.get_mut(cmd.driver) {
                entry.current_ride = Some(ride.id);
            }
            clock.cancel_timer(EventKind::MatchTimeout, EventSubject::Ride(ride.id));
            channels.join(ride.id, ride.rider);
            channels.join(ride.id, cmd.driver);
            telemetry.rides_assigned += 1;
            debug!(ride = ?ride.id, driver = ?cmd.driver, "driver assigned");

            deliver_to_user(
                &presence,
                ride.rider,
                ClientEvent::DriverAssigned(DriverAssigned {
                    ride: ride.id,
                    driver: cmd.driver,
                    driver_location: location.get(cmd.driver).map(|l| l.point),
                }),
            );
            deliver_to_user(
                &presence,
                cmd.driver,
                ClientEvent::RideAssigned(RideAssigned {
                    ride: ride.id,
                    rider: ride.rider,
                    pickup: ride.pickup,
                    destination: ride.destination,
                    fare_estimate: ride.fare_estimate,
                }),
            );
        }
        Err(DispatchError::InvalidTransition(_)) => {
            // Lost the race (or the ride left the biddable state).
            telemetry.accept_conflicts += 1;
            deliver_to_user(
                &presence,
                cmd.driver,
                ClientEvent::RideUnavailable(RideUnavailable { ride: cmd.ride }),
            );
        }
        Err(err) => {
            debug!(ride = ?cmd.ride, %err, "accept failed");
        }
    }
}
