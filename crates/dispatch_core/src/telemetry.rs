//! Telemetry / KPIs: dispatch counters and completed-ride records.

use bevy_ecs::prelude::Resource;

use crate::ride::{RideId, UserId};

/// One completed ride, recorded when the trip ends.
/// Timestamps are engine clock ms; use the helper methods for derived KPIs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRideRecord {
    pub ride: RideId,
    pub rider: UserId,
    pub driver: UserId,
    pub requested_at: u64,
    pub assigned_at: u64,
    pub started_at: u64,
    pub completed_at: u64,
    pub fare: f64,
}

impl CompletedRideRecord {
    /// Time from request to driver assignment.
    pub fn time_to_assign(&self) -> u64 {
        self.assigned_at.saturating_sub(self.requested_at)
    }

    /// Time from assignment to trip start (passenger on board).
    pub fn time_to_pickup(&self) -> u64 {
        self.started_at.saturating_sub(self.assigned_at)
    }

    pub fn trip_duration(&self) -> u64 {
        self.completed_at.saturating_sub(self.started_at)
    }
}

/// Collects dispatch telemetry. Insert as a resource to record activity.
#[derive(Debug, Default, Resource)]
pub struct DispatchTelemetry {
    pub rides_requested: u64,
    pub offers_sent: u64,
    pub rides_assigned: u64,
    pub accept_conflicts: u64,
    pub rides_completed: u64,
    pub rides_cancelled_by_rider: u64,
    pub rides_cancelled_by_driver: u64,
    pub rides_cancelled_no_driver: u64,
    pub stale_timers_dropped: u64,
    pub location_updates_dropped: u64,
    pub alerts_triggered: u64,
    pub alerts_escalated: u64,
    pub notifier_failures: u64,
    pub completed_rides: Vec<CompletedRideRecord>,
}
