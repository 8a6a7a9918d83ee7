//! Event routing between the dispatch systems and connected clients.
//!
//! Three channel shapes: per-identity (targeted delivery), per-ride (joined
//! explicitly by the ride's two parties, used for in-trip traffic), and
//! role-broadcast (admin alert fan-out; read-only for drivers). This layer
//! only fans out — it never reorders or batches. Status events for one ride
//! arrive in application order because the single event loop is the only
//! writer and delivery happens synchronously with each transition.
//!
//! Delivery to an identity without a live presence entry is dropped: the
//! client resyncs from the stores on reconnect.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;
use tracing::trace;

use crate::events::ClientEvent;
use crate::presence::{PresenceRegistry, Role};
use crate::ride::{RideId, UserId};

/// Membership of the per-ride channels.
#[derive(Debug, Default, Resource)]
pub struct RideChannels {
    members: HashMap<RideId, Vec<UserId>>,
}

impl RideChannels {
    pub fn join(&mut self, ride: RideId, user: UserId) {
        let members = self.members.entry(ride).or_default();
        if !members.contains(&user) {
            members.push(user);
        }
    }

    pub fn leave(&mut self, ride: RideId, user: UserId) {
        if let Some(members) = self.members.get_mut(&ride) {
            members.retain(|m| *m != user);
            if members.is_empty() {
                self.members.remove(&ride);
            }
        }
    }

    pub fn members(&self, ride: RideId) -> &[UserId] {
        self.members.get(&ride).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_member(&self, ride: RideId, user: UserId) -> bool {
        self.members(ride).contains(&user)
    }

    /// Tears the channel down once the ride reaches a terminal status.
    pub fn remove(&mut self, ride: RideId) {
        self.members.remove(&ride);
    }
}

/// Targeted delivery to one identity's personal channel.
pub fn deliver_to_user(presence: &PresenceRegistry, user: UserId, event: ClientEvent) {
    match presence.get(user) {
        Some(entry) => entry.channel.deliver(event),
        None => trace!(?user, "dropping event for offline identity"),
    }
}

/// Delivery to every member of a ride channel.
pub fn deliver_to_ride(
    presence: &PresenceRegistry,
    channels: &RideChannels,
    ride: RideId,
    event: ClientEvent,
) {
    for member in channels.members(ride) {
        deliver_to_user(presence, *member, event.clone());
    }
}

/// Delivery to every connected identity holding `role`.
pub fn broadcast_role(presence: &PresenceRegistry, role: Role, event: ClientEvent) {
    for user in presence.users_with_role(role) {
        deliver_to_user(presence, user, event.clone());
    }
}
