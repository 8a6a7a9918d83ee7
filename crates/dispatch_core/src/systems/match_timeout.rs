//! No-driver fallback: cancels a ride left unassigned past the offer window.

use bevy_ecs::prelude::{Res, ResMut};
use tracing::debug;

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::coordination::{deliver_to_user, RideChannels};
use crate::events::{ClientEvent, RideCancelled};
use crate::presence::PresenceRegistry;
use crate::ride::{Cancellation, CancelledBy, RideStatus};
use crate::state_machine::apply_transition;
use crate::store::{RideFields, RideStoreResource};
use crate::telemetry::DispatchTelemetry;

pub const NO_DRIVERS_REASON: &str = "no drivers available";

pub fn match_timeout_system(
    event: Res<CurrentEvent>,
    clock: Res<DispatchClock>,
    mut store: ResMut<RideStoreResource>,
    presence: Res<PresenceRegistry>,
    mut channels: ResMut<RideChannels>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::MatchTimeout {
        return;
    }
    let Some(EventSubject::Ride(ride_id)) = event.0.subject else {
        return;
    };
    let Ok(ride) = store.get(ride_id) else {
        return;
    };

    // Stale-timer guard: a timer that outlived an assignment (or any other
    // exit from the biddable state) is a silent no-op.
    if !ride.status.is_biddable() || ride.driver.is_some() {
        telemetry.stale_timers_dropped += 1;
        return;
    }

    let cancellation = Cancellation {
        reason: NO_DRIVERS_REASON.to_string(),
        charge: 0.0,
    };
    match apply_transition(
        &mut **store,
        ride_id,
        ride.status,
        RideStatus::CancelledBySystem,
        RideFields {
            cancellation: Some(cancellation.clone()),
            ..Default::default()
        },
        clock.now(),
    ) {
        Ok(cancelled) => {
            telemetry.rides_cancelled_no_driver += 1;
            channels.remove(cancelled.id);
            deliver_to_user(
                &presence,
                cancelled.rider,
                ClientEvent::RideCancelled(RideCancelled {
                    ride: cancelled.id,
                    cancelled_by: CancelledBy::System,
                    reason: cancellation.reason,
                    charge: cancellation.charge,
                }),
            );
        }
        Err(err) => {
            // Another transition landed between the guard and the update.
            debug!(ride = ?ride_id, %err, "timeout dropped after losing a race");
            telemetry.stale_timers_dropped += 1;
        }
    }
}
