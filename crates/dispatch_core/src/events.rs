//! Typed client-facing events: one payload type per event name.
//!
//! Everything a connected client can receive is a [ClientEvent] variant.
//! Delivery goes through [crate::presence::EventSink] handles held in the
//! presence registry; this module only declares the shapes.

use serde::Serialize;

use crate::alert::{AlertId, SosSeverity, SosStatus};
use crate::presence::Role;
use crate::ride::{CancelledBy, RideId, RideStatus, UserId, VehicleType};
use crate::spatial::GeoPoint;

/// Identity bound to a connection after a successful authenticate exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Authenticated {
    pub user: UserId,
    pub role: Role,
}

/// Ride offer fanned out to one candidate driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRideRequest {
    pub ride: RideId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub vehicle_type: VehicleType,
    pub fare_estimate: f64,
    /// Distance from this candidate's last known location to the pickup.
    pub pickup_distance_km: f64,
}

/// Progress report to the rider while the ride is being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RideUpdate {
    pub ride: RideId,
    pub status: RideStatus,
}

/// Sent to the rider when a driver wins the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverAssigned {
    pub ride: RideId,
    pub driver: UserId,
    pub driver_location: Option<GeoPoint>,
}

/// Sent to the winning driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideAssigned {
    pub ride: RideId,
    pub rider: UserId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub fare_estimate: f64,
}

/// Non-alarming signal to a driver whose accept lost the race (or whose
/// offer went stale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RideUnavailable {
    pub ride: RideId,
}

/// Live driver position forwarded to the rider of the driver's current ride.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverLocation {
    pub ride: RideId,
    pub driver: UserId,
    pub location: GeoPoint,
    pub recorded_at: u64,
}

/// Status transition fanned out to both parties, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RideStatusUpdate {
    pub ride: RideId,
    pub status: RideStatus,
    pub fare_actual: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideCancelled {
    pub ride: RideId,
    pub cancelled_by: CancelledBy,
    pub reason: String,
    pub charge: f64,
}

/// In-trip message on the per-ride channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideMessage {
    pub ride: RideId,
    pub from: UserId,
    pub text: String,
    pub sent_at: u64,
}

/// Acknowledgement to the user who triggered an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SosAlertSent {
    pub alert: AlertId,
}

/// Alert fan-out to admins, nearby drivers, and the ride counter-party.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SosAlertEvent {
    pub alert: AlertId,
    pub user: UserId,
    pub location: GeoPoint,
    pub severity: SosSeverity,
    pub ride: Option<RideId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SosStatusUpdate {
    pub alert: AlertId,
    pub status: SosStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticated(Authenticated),
    NewRideRequest(NewRideRequest),
    RideUpdate(RideUpdate),
    DriverAssigned(DriverAssigned),
    RideAssigned(RideAssigned),
    RideUnavailable(RideUnavailable),
    DriverLocation(DriverLocation),
    RideStatusUpdate(RideStatusUpdate),
    RideCancelled(RideCancelled),
    RideMessage(RideMessage),
    SosAlertSent(SosAlertSent),
    SosAlertEvent(SosAlertEvent),
    SosStatusUpdate(SosStatusUpdate),
}
