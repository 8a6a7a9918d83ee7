//! Driver-reported trip progress: arriving, arrived, start, completion.

use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, DispatchClock, EventKind};
use crate::commands::{PendingProgressUpdates, RideProgressCmd};
use crate::coordination::{deliver_to_ride, deliver_to_user, RideChannels};
use crate::events::{ClientEvent, RideStatusUpdate};
use crate::presence::PresenceRegistry;
use crate::pricing::{fare_for_distance, PricingConfig};
use crate::ride::{Ride, RideStatus};
use crate::spatial::haversine_km;
use crate::state_machine::apply_transition;
use crate::store::{RideFields, RideStoreResource};
use crate::telemetry::{CompletedRideRecord, DispatchTelemetry};

/// The one legal predecessor of each driver-reported status.
fn expected_from(to: RideStatus) -> Option<RideStatus> {
    match to {
        RideStatus::DriverArriving => Some(RideStatus::DriverAssigned),
        RideStatus::DriverArrived => Some(RideStatus::DriverArriving),
        RideStatus::InProgress => Some(RideStatus::DriverArrived),
        RideStatus::Completed => Some(RideStatus::InProgress),
        _ => None,
    }
}

fn completion_fields(cmd: &RideProgressCmd, ride: &Ride, pricing: &PricingConfig) -> RideFields {
    if cmd.to != RideStatus::Completed {
        return RideFields::default();
    }
    let distance_km = cmd
        .actual_distance_km
        .unwrap_or_else(|| haversine_km(ride.pickup, ride.destination));
    RideFields {
        fare_actual: Some(fare_for_distance(pricing, distance_km)),
        ..Default::default()
    }
}

pub fn ride_progress_system(
    event: Res<CurrentEvent>,
    clock: Res<DispatchClock>,
    mut pending: ResMut<PendingProgressUpdates>,
    mut store: ResMut<RideStoreResource>,
    mut presence: ResMut<PresenceRegistry>,
    mut channels: ResMut<RideChannels>,
    pricing: Res<PricingConfig>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::RideProgress {
        return;
    }
    let Some(cmd) = pending.0.pop_front() else {
        return;
    };
    let Some(expected) = expected_from(cmd.to) else {
        return;
    };
    let Ok(ride) = store.get(cmd.ride) else {
        return;
    };
    if ride.driver != Some(cmd.actor) {
        return;
    }

    let fields = completion_fields(&cmd, &ride, &pricing);
    match apply_transition(&mut **store, cmd.ride, expected, cmd.to, fields, clock.now()) {
        Ok(updated) => {
            deliver_to_ride(
                &presence,
                &channels,
                updated.id,
                ClientEvent::RideStatusUpdate(RideStatusUpdate {
                    ride: updated.id,
                    status: updated.status,
                    fare_actual: updated.fare_actual,
                }),
            );
            if updated.status == RideStatus::Completed {
                finish_ride(&updated, &mut presence, &mut channels, &mut telemetry);
            }
        }
        Err(err) => {
            // The ride moved on concurrently; resync the actor's view with
            // the persisted status instead of surfacing an error.
            debug!(ride = ?cmd.ride, %err, "progress update lost a race");
            if let Ok(current) = store.get(cmd.ride) {
                deliver_to_user(
                    &presence,
                    cmd.actor,
                    ClientEvent::RideStatusUpdate(RideStatusUpdate {
                        ride: current.id,
                        status: current.status,
                        fare_actual: current.fare_actual,
                    }),
                );
            }
        }
    }
}

/// Completion side effects: free the driver, close the ride channel, record
/// the trip.
fn finish_ride(
    ride: &Ride,
    presence: &mut PresenceRegistry,
    channels: &mut RideChannels,
    telemetry: &mut DispatchTelemetry,
) {
    if let Some(driver) = ride.driver {
        if let Some(entry) = presence.get_mut(driver) {
            if entry.current_ride == Some(ride.id) {
                entry.current_ride = None;
            }
        }
    }
    channels.remove(ride.id);
    telemetry.rides_completed += 1;
    if let (Some(driver), Some(fare)) = (ride.driver, ride.fare_actual) {
        telemetry.completed_rides.push(CompletedRideRecord {
            ride: ride.id,
            rider: ride.rider,
            driver,
            requested_at: ride.requested_at,
            assigned_at: ride.assigned_at.unwrap_or(ride.requested_at),
            started_at: ride.started_at.unwrap_or(ride.requested_at),
            completed_at: ride.completed_at.unwrap_or(ride.requested_at),
            fare,
        });
    }
}
