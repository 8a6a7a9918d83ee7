//! In-trip messaging over the per-ride channel.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind};
use crate::commands::PendingRideMessages;
use crate::coordination::{deliver_to_ride, RideChannels};
use crate::events::{ClientEvent, RideMessage};
use crate::presence::PresenceRegistry;

pub fn ride_message_system(
    event: Res<CurrentEvent>,
    clock: Res<DispatchClock>,
    mut pending: ResMut<PendingRideMessages>,
    presence: Res<PresenceRegistry>,
    channels: Res<RideChannels>,
) {
    if event.0.kind != EventKind::RideMessage {
        return;
    }
    let Some(cmd) = pending.0.pop_front() else {
        return;
    };
    // Only current channel members may post; a party that cancelled out of
    // the ride lost its membership.
    if !channels.is_member(cmd.ride, cmd.from) {
        return;
    }
    deliver_to_ride(
        &presence,
        &channels,
        cmd.ride,
        ClientEvent::RideMessage(RideMessage {
            ride: cmd.ride,
            from: cmd.from,
            text: cmd.text,
            sent_at: clock.now(),
        }),
    );
}
