//! Ride records and the ride status lifecycle.
//!
//! A [Ride] is the authoritative per-trip record held in the ride store.
//! Status changes go through [crate::state_machine::apply_transition]; this
//! module only declares the data shapes and which transitions are legal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::spatial::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RideId(pub Uuid);

impl RideId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RideId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Economy,
    Comfort,
    Premium,
    Xl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    SearchingDriver,
    DriverAssigned,
    DriverArriving,
    DriverArrived,
    InProgress,
    Completed,
    CancelledByRider,
    CancelledByDriver,
    CancelledBySystem,
}

impl RideStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RideStatus::Completed
                | RideStatus::CancelledByRider
                | RideStatus::CancelledByDriver
                | RideStatus::CancelledBySystem
        )
    }

    pub fn is_cancelled(self) -> bool {
        matches!(
            self,
            RideStatus::CancelledByRider
                | RideStatus::CancelledByDriver
                | RideStatus::CancelledBySystem
        )
    }

    /// A ride in a biddable status can still be offered to drivers.
    pub fn is_biddable(self) -> bool {
        matches!(self, RideStatus::Requested | RideStatus::SearchingDriver)
    }
}

/// Who initiated a cancellation, for reporting to both parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Rider,
    Driver,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    /// Charge applied to the rider, in the same currency unit as fares.
    pub charge: f64,
}

/// Client-supplied fields of a new ride request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideDraft {
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_type: VehicleType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub rider: UserId,
    /// Assigned driver; set once per assignment episode, cleared when the
    /// driver cancels before arrival and the ride returns to search.
    pub driver: Option<UserId>,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_type: VehicleType,
    pub status: RideStatus,
    pub fare_estimate: f64,
    pub fare_actual: Option<f64>,
    pub requested_at: u64,
    pub assigned_at: Option<u64>,
    pub arriving_at: Option<u64>,
    pub arrived_at: Option<u64>,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub cancelled_at: Option<u64>,
    pub cancellation: Option<Cancellation>,
    /// Drivers who cancelled an earlier assignment episode of this ride;
    /// skipped on every later fan-out round.
    pub excluded_drivers: Vec<UserId>,
}

impl Ride {
    pub fn new(
        id: RideId,
        rider: UserId,
        draft: RideDraft,
        fare_estimate: f64,
        requested_at: u64,
    ) -> Self {
        Self {
            id,
            rider,
            driver: None,
            pickup: draft.pickup,
            destination: draft.destination,
            vehicle_type: draft.vehicle_type,
            status: RideStatus::Requested,
            fare_estimate,
            fare_actual: None,
            requested_at,
            assigned_at: None,
            arriving_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation: None,
            excluded_drivers: Vec::new(),
        }
    }

    pub fn is_party(&self, user: UserId) -> bool {
        self.rider == user || self.driver == Some(user)
    }
}
