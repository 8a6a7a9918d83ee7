//! Dispatch of a new (or returned-to-search) ride: candidate fan-out and the
//! no-driver timer.

use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject, ONE_SEC_MS};
use crate::config::MatchingConfig;
use crate::coordination::deliver_to_user;
use crate::events::{ClientEvent, NewRideRequest, RideUpdate};
use crate::matching::{find_candidates, MatchingPolicyResource};
use crate::presence::PresenceRegistry;
use crate::ride::RideStatus;
use crate::spatial::LocationCache;
use crate::state_machine::apply_transition;
use crate::store::{RideFields, RideStoreResource};
use crate::telemetry::DispatchTelemetry;

pub fn ride_request_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<DispatchClock>,
    mut store: ResMut<RideStoreResource>,
    presence: Res<PresenceRegistry>,
    location: Res<LocationCache>,
    policy: Res<MatchingPolicyResource>,
    config: Res<MatchingConfig>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::RideRequested {
        return;
    }
    let Some(EventSubject::Ride(ride_id)) = event.0.subject else {
        return;
    };
    let Ok(ride) = store.get(ride_id) else {
        return;
    };

    // Stale guard: the rider may have cancelled between submit and dispatch.
    let ride = match ride.status {
        RideStatus::Requested => {
            match apply_transition(
                &mut **store,
                ride_id,
                RideStatus::Requested,
                RideStatus::SearchingDriver,
                RideFields::default(),
                clock.now(),
            ) {
                Ok(updated) => updated,
                Err(_) => return,
            }
        }
        // Re-dispatch after a driver cancelled before arrival.
        RideStatus::SearchingDriver => ride,
        _ => return,
    };

    deliver_to_user(
        &presence,
        ride.rider,
        ClientEvent::RideUpdate(RideUpdate {
            ride: ride.id,
            status: ride.status,
        }),
    );

    let candidates = find_candidates(&location, &presence, &policy, &config, &ride);
    debug!(ride = ?ride.id, candidates = candidates.len(), "fanning out ride offer");
    telemetry.offers_sent += candidates.len() as u64;
    for candidate in &candidates {
        deliver_to_user(
            &presence,
            candidate.driver,
            ClientEvent::NewRideRequest(NewRideRequest {
                ride: ride.id,
                pickup: ride.pickup,
                destination: ride.destination,
                vehicle_type: ride.vehicle_type,
                fare_estimate: ride.fare_estimate,
                pickup_distance_km: candidate.distance_km,
            }),
        );
    }

    // One timer per ride, armed even with zero candidates: if nobody accepts
    // within the window the system cancels the ride.
    clock.schedule_timer_in(
        config.offer_timeout_secs * ONE_SEC_MS,
        EventKind::MatchTimeout,
        EventSubject::Ride(ride.id),
    );
}
