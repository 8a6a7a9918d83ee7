//! Pending client commands, queued for the event loop.
//!
//! Each mutating command gets a payload struct and a FIFO queue resource; the
//! engine pushes the payload and schedules the matching clock event at the
//! current timestamp, so queue order and event order always agree.

use std::collections::VecDeque;

use bevy_ecs::prelude::Resource;

use crate::alert::{AlertId, SosStatus};
use crate::ride::{RideId, RideStatus, UserId};
use crate::spatial::DriverLocation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverResponseCmd {
    pub driver: UserId,
    pub ride: RideId,
    pub accept: bool,
}

#[derive(Debug, Default, Resource)]
pub struct PendingDriverResponses(pub VecDeque<DriverResponseCmd>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationUpdateCmd {
    pub driver: UserId,
    pub location: DriverLocation,
}

#[derive(Debug, Default, Resource)]
pub struct PendingLocationUpdates(pub VecDeque<LocationUpdateCmd>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RideProgressCmd {
    pub actor: UserId,
    pub ride: RideId,
    pub to: RideStatus,
    /// Driver-reported trip distance, used for the actual fare on
    /// completion.
    pub actual_distance_km: Option<f64>,
}

#[derive(Debug, Default, Resource)]
pub struct PendingProgressUpdates(pub VecDeque<RideProgressCmd>);

#[derive(Debug, Clone, PartialEq)]
pub struct CancelCmd {
    pub actor: UserId,
    pub ride: RideId,
    pub reason: String,
}

#[derive(Debug, Default, Resource)]
pub struct PendingCancellations(pub VecDeque<CancelCmd>);

#[derive(Debug, Clone, PartialEq)]
pub struct RideMessageCmd {
    pub from: UserId,
    pub ride: RideId,
    pub text: String,
}

#[derive(Debug, Default, Resource)]
pub struct PendingRideMessages(pub VecDeque<RideMessageCmd>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SosProgressCmd {
    pub actor: UserId,
    pub alert: AlertId,
    pub to: SosStatus,
}

#[derive(Debug, Default, Resource)]
pub struct PendingSosUpdates(pub VecDeque<SosProgressCmd>);
