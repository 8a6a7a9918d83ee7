//! Durable record stores for rides and alerts.
//!
//! The stores are external collaborators: the only mutation primitive is an
//! atomic conditional update (`set_if`) keyed on the expected prior status,
//! which is how every race in the system is resolved. The in-memory
//! implementations are the defaults; a deployment backs the traits with a
//! document store offering the same compare-and-swap semantics.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;
use thiserror::Error;

use crate::alert::{AlertId, SosAlert, SosStatus};
use crate::ride::{Cancellation, Ride, RideId, RideStatus, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record's current status did not match the expected one; nothing
    /// was written.
    #[error("conditional update failed: status mismatch")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Field changes applied together with a ride status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideFields {
    /// `Some(Some(id))` assigns a driver, `Some(None)` clears the slot
    /// (reassignment episode), `None` leaves it untouched.
    pub driver: Option<Option<UserId>>,
    pub fare_actual: Option<f64>,
    pub cancellation: Option<Cancellation>,
    /// Driver to add to the ride's fan-out exclusion list.
    pub exclude_driver: Option<UserId>,
}

pub trait RideStore: Send + Sync {
    fn create(&mut self, ride: Ride) -> Result<(), StoreError>;

    fn get(&self, id: RideId) -> Result<Ride, StoreError>;

    /// Atomic conditional update: applies `status` and `fields` only when the
    /// ride's current status equals `expected`, stamping the transition time
    /// from `now`. Returns the updated record.
    fn set_if(
        &mut self,
        id: RideId,
        expected: RideStatus,
        status: RideStatus,
        fields: RideFields,
        now: u64,
    ) -> Result<Ride, StoreError>;

    /// The user's one non-terminal ride (as rider or driver), if any.
    fn active_ride_for(&self, user: UserId) -> Option<Ride>;

    /// Terminal rides the user was a party to, most recent first.
    fn history_for(&self, user: UserId) -> Vec<Ride>;
}

#[derive(Debug, Default)]
pub struct InMemoryRideStore {
    rides: HashMap<RideId, Ride>,
}

impl InMemoryRideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RideStore for InMemoryRideStore {
    fn create(&mut self, ride: Ride) -> Result<(), StoreError> {
        self.rides.insert(ride.id, ride);
        Ok(())
    }

    fn get(&self, id: RideId) -> Result<Ride, StoreError> {
        self.rides.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn set_if(
        &mut self,
        id: RideId,
        expected: RideStatus,
        status: RideStatus,
        fields: RideFields,
        now: u64,
    ) -> Result<Ride, StoreError> {
        let ride = self.rides.get_mut(&id).ok_or(StoreError::NotFound)?;
        if ride.status != expected {
            return Err(StoreError::Conflict);
        }
        ride.status = status;
        match status {
            RideStatus::DriverAssigned => ride.assigned_at = Some(now),
            RideStatus::DriverArriving => ride.arriving_at = Some(now),
            RideStatus::DriverArrived => ride.arrived_at = Some(now),
            RideStatus::InProgress => ride.started_at = Some(now),
            RideStatus::Completed => ride.completed_at = Some(now),
            RideStatus::CancelledByRider
            | RideStatus::CancelledByDriver
            | RideStatus::CancelledBySystem => ride.cancelled_at = Some(now),
            RideStatus::Requested | RideStatus::SearchingDriver => {}
        }
        if let Some(driver) = fields.driver {
            ride.driver = driver;
        }
        if let Some(fare) = fields.fare_actual {
            ride.fare_actual = Some(fare);
        }
        if let Some(cancellation) = fields.cancellation {
            ride.cancellation = Some(cancellation);
        }
        if let Some(excluded) = fields.exclude_driver {
            if !ride.excluded_drivers.contains(&excluded) {
                ride.excluded_drivers.push(excluded);
            }
        }
        Ok(ride.clone())
    }

    fn active_ride_for(&self, user: UserId) -> Option<Ride> {
        self.rides
            .values()
            .find(|ride| !ride.status.is_terminal() && ride.is_party(user))
            .cloned()
    }

    fn history_for(&self, user: UserId) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self
            .rides
            .values()
            .filter(|ride| ride.status.is_terminal() && ride.is_party(user))
            .cloned()
            .collect();
        rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        rides
    }
}

pub trait AlertStore: Send + Sync {
    fn create(&mut self, alert: SosAlert) -> Result<(), StoreError>;

    fn get(&self, id: AlertId) -> Result<SosAlert, StoreError>;

    /// Atomic conditional status update, same contract as
    /// [RideStore::set_if].
    fn set_if(
        &mut self,
        id: AlertId,
        expected: SosStatus,
        status: SosStatus,
        now: u64,
    ) -> Result<SosAlert, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: HashMap<AlertId, SosAlert>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertStore for InMemoryAlertStore {
    fn create(&mut self, alert: SosAlert) -> Result<(), StoreError> {
        self.alerts.insert(alert.id, alert);
        Ok(())
    }

    fn get(&self, id: AlertId) -> Result<SosAlert, StoreError> {
        self.alerts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn set_if(
        &mut self,
        id: AlertId,
        expected: SosStatus,
        status: SosStatus,
        now: u64,
    ) -> Result<SosAlert, StoreError> {
        let alert = self.alerts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if alert.status != expected {
            return Err(StoreError::Conflict);
        }
        alert.status = status;
        alert.updated_at = now;
        if status == SosStatus::Escalated {
            alert.escalated_at = Some(now);
        }
        Ok(alert.clone())
    }
}

/// Resource wrapper for the ride store trait object.
#[derive(Resource)]
pub struct RideStoreResource(pub Box<dyn RideStore>);

impl RideStoreResource {
    pub fn in_memory() -> Self {
        Self(Box::new(InMemoryRideStore::new()))
    }
}

impl std::ops::Deref for RideStoreResource {
    type Target = dyn RideStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for RideStoreResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

/// Resource wrapper for the alert store trait object.
#[derive(Resource)]
pub struct AlertStoreResource(pub Box<dyn AlertStore>);

impl AlertStoreResource {
    pub fn in_memory() -> Self {
        Self(Box::new(InMemoryAlertStore::new()))
    }
}

impl std::ops::Deref for AlertStoreResource {
    type Target = dyn AlertStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for AlertStoreResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::{RideDraft, VehicleType};
    use crate::spatial::GeoPoint;

    fn draft() -> RideDraft {
        RideDraft {
            pickup: GeoPoint::new(52.52, 13.405),
            destination: GeoPoint::new(52.53, 13.42),
            vehicle_type: VehicleType::Economy,
        }
    }

    #[test]
    fn set_if_rejects_stale_expectations() {
        let mut store = InMemoryRideStore::new();
        let ride = Ride::new(RideId::new(), UserId::new(), draft(), 12.0, 0);
        let id = ride.id;
        store.create(ride).expect("create");

        store
            .set_if(
                id,
                RideStatus::Requested,
                RideStatus::SearchingDriver,
                RideFields::default(),
                5,
            )
            .expect("first transition");

        let err = store
            .set_if(
                id,
                RideStatus::Requested,
                RideStatus::SearchingDriver,
                RideFields::default(),
                6,
            )
            .expect_err("stale expectation");
        assert_eq!(err, StoreError::Conflict);
    }

    #[test]
    fn set_if_stamps_transition_times_and_fields() {
        let mut store = InMemoryRideStore::new();
        let driver = UserId::new();
        let ride = Ride::new(RideId::new(), UserId::new(), draft(), 12.0, 0);
        let id = ride.id;
        store.create(ride).expect("create");
        store
            .set_if(
                id,
                RideStatus::Requested,
                RideStatus::SearchingDriver,
                RideFields::default(),
                1,
            )
            .expect("searching");

        let updated = store
            .set_if(
                id,
                RideStatus::SearchingDriver,
                RideStatus::DriverAssigned,
                RideFields {
                    driver: Some(Some(driver)),
                    ..Default::default()
                },
                7,
            )
            .expect("assignment");

        assert_eq!(updated.driver, Some(driver));
        assert_eq!(updated.assigned_at, Some(7));
    }

    #[test]
    fn active_ride_excludes_terminal_rides() {
        let mut store = InMemoryRideStore::new();
        let rider = UserId::new();
        let ride = Ride::new(RideId::new(), rider, draft(), 12.0, 0);
        let id = ride.id;
        store.create(ride).expect("create");
        assert!(store.active_ride_for(rider).is_some());

        store
            .set_if(
                id,
                RideStatus::Requested,
                RideStatus::CancelledByRider,
                RideFields {
                    cancellation: Some(Cancellation {
                        reason: "changed plans".into(),
                        charge: 0.0,
                    }),
                    ..Default::default()
                },
                3,
            )
            .expect("cancel");

        assert!(store.active_ride_for(rider).is_none());
        assert_eq!(store.history_for(rider).len(), 1);
    }
}
