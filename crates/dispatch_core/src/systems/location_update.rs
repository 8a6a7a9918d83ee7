//! Driver location ingestion: latest-wins cache update plus live sharing
//! with the rider of the driver's current ride.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::{CurrentEvent, EventKind};
use crate::commands::PendingLocationUpdates;
use crate::coordination::deliver_to_user;
use crate::events::{ClientEvent, DriverLocation};
use crate::presence::PresenceRegistry;
use crate::spatial::LocationCache;
use crate::store::RideStoreResource;
use crate::telemetry::DispatchTelemetry;

pub fn location_update_system(
    event: Res<CurrentEvent>,
    mut pending: ResMut<PendingLocationUpdates>,
    mut location: ResMut<LocationCache>,
    presence: Res<PresenceRegistry>,
    store: Res<RideStoreResource>,
    mut telemetry: ResMut<DispatchTelemetry>,
) {
    if event.0.kind != EventKind::LocationUpdate {
        return;
    }
    let Some(cmd) = pending.0.pop_front() else {
        return;
    };
    // Updates from identities without presence are dropped; the cache only
    // tracks connected drivers.
    let Some(entry) = presence.get(cmd.driver) else {
        return;
    };

    if !location.update(cmd.driver, cmd.location) {
        // Older than the cached fix; latest wins.
        telemetry.location_updates_dropped += 1;
        return;
    }

    // Share the position with the rider of whatever ride this driver
    // currently serves.
    let Some(ride_id) = entry.current_ride else {
        return;
    };
    let Ok(ride) = store.get(ride_id) else {
        return;
    };
    if ride.driver == Some(cmd.driver) && !ride.status.is_terminal() {
        deliver_to_user(
            &presence,
            ride.rider,
            ClientEvent::DriverLocation(DriverLocation {
                ride: ride.id,
                driver: cmd.driver,
                location: cmd.location.point,
                recorded_at: cmd.location.recorded_at,
            }),
        );
    }
}
