//! Ride status transition table and the conditional-update wrapper around it.

use crate::config::CancellationConfig;
use crate::error::DispatchError;
use crate::ride::{Ride, RideId, RideStatus};
use crate::store::{RideFields, RideStore, StoreError};

/// Declared legal ride transitions.
///
/// Cancellation is reachable from every non-terminal status except
/// `in_progress`; `driver_assigned`/`driver_arriving` may fall back to
/// `searching_driver` when the driver cancels before arrival (reassignment
/// episode).
pub fn transition_allowed(from: RideStatus, to: RideStatus) -> bool {
    use RideStatus::*;
    if from.is_terminal() {
        return false;
    }
    match (from, to) {
        (Requested, SearchingDriver) => true,
        (SearchingDriver, DriverAssigned) => true,
        (DriverAssigned, DriverArriving) => true,
        (DriverArriving, DriverArrived) => true,
        (DriverArrived, InProgress) => true,
        (InProgress, Completed) => true,
        // Driver cancelled before arrival; back to search.
        (DriverAssigned | DriverArriving, SearchingDriver) => true,
        // A trip in progress can only complete.
        (InProgress, CancelledByRider | CancelledByDriver | CancelledBySystem) => false,
        (_, CancelledByRider | CancelledByDriver | CancelledBySystem) => true,
        _ => false,
    }
}

/// Applies one status transition as an atomic conditional update.
///
/// Succeeds only when the transition is declared legal and the ride's
/// persisted status still equals `from_expected`; otherwise fails with
/// `INVALID_STATUS_TRANSITION` and mutates nothing.
pub fn apply_transition(
    store: &mut dyn RideStore,
    ride_id: RideId,
    from_expected: RideStatus,
    to: RideStatus,
    fields: RideFields,
    now: u64,
) -> Result<Ride, DispatchError> {
    if !transition_allowed(from_expected, to) {
        return Err(DispatchError::InvalidTransition(format!(
            "{from_expected:?} -> {to:?}"
        )));
    }
    store
        .set_if(ride_id, from_expected, to, fields, now)
        .map_err(|err| match err {
            StoreError::Conflict => {
                DispatchError::InvalidTransition(format!("ride is no longer {from_expected:?}"))
            }
            other => DispatchError::from_store(other, "ride"),
        })
}

/// Charge applied when the rider cancels at `status`.
///
/// Free at or before `driver_assigned`/`driver_arriving`; a percentage of the
/// estimate once the driver has arrived; refused outright once the trip is in
/// progress (and from terminal states).
pub fn cancellation_charge(
    status: RideStatus,
    fare_estimate: f64,
    config: &CancellationConfig,
) -> Result<f64, DispatchError> {
    use RideStatus::*;
    match status {
        Requested | SearchingDriver | DriverAssigned | DriverArriving => Ok(0.0),
        DriverArrived => Ok(fare_estimate * config.arrived_charge_pct),
        InProgress => Err(DispatchError::InvalidTransition(
            "cannot cancel a ride in progress".into(),
        )),
        _ => Err(DispatchError::InvalidTransition(
            "ride already reached a terminal status".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::{RideDraft, UserId, VehicleType};
    use crate::spatial::GeoPoint;
    use crate::store::InMemoryRideStore;

    #[test]
    fn happy_path_is_a_legal_chain() {
        use RideStatus::*;
        let path = [
            Requested,
            SearchingDriver,
            DriverAssigned,
            DriverArriving,
            DriverArrived,
            InProgress,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(transition_allowed(pair[0], pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn no_shortcuts_to_completed() {
        use RideStatus::*;
        for from in [Requested, SearchingDriver, DriverAssigned, DriverArriving, DriverArrived] {
            assert!(!transition_allowed(from, Completed), "{from:?}");
        }
    }

    #[test]
    fn in_progress_cannot_be_cancelled() {
        use RideStatus::*;
        for to in [CancelledByRider, CancelledByDriver, CancelledBySystem] {
            assert!(!transition_allowed(InProgress, to), "{to:?}");
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        use RideStatus::*;
        for from in [Completed, CancelledByRider, CancelledByDriver, CancelledBySystem] {
            for to in [SearchingDriver, DriverAssigned, InProgress, Completed, CancelledByRider] {
                assert!(!transition_allowed(from, to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn charge_schedule_matches_policy() {
        let config = CancellationConfig::default();
        assert_eq!(
            cancellation_charge(RideStatus::Requested, 100.0, &config).expect("free"),
            0.0
        );
        assert_eq!(
            cancellation_charge(RideStatus::DriverArriving, 100.0, &config).expect("free"),
            0.0
        );
        let arrived = cancellation_charge(RideStatus::DriverArrived, 100.0, &config)
            .expect("charged");
        assert!((arrived - 10.0).abs() < 1e-9);
        assert!(cancellation_charge(RideStatus::InProgress, 100.0, &config).is_err());
    }

    #[test]
    fn apply_transition_refuses_undeclared_edges_without_touching_the_store() {
        let mut store = InMemoryRideStore::new();
        let ride = Ride::new(
            RideId::new(),
            UserId::new(),
            RideDraft {
                pickup: GeoPoint::new(52.52, 13.405),
                destination: GeoPoint::new(52.53, 13.42),
                vehicle_type: VehicleType::Economy,
            },
            10.0,
            0,
        );
        let id = ride.id;
        store.create(ride).expect("create");

        let err = apply_transition(
            &mut store,
            id,
            RideStatus::Requested,
            RideStatus::Completed,
            RideFields::default(),
            1,
        )
        .expect_err("undeclared edge");
        assert_eq!(err.code(), "INVALID_STATUS_TRANSITION");
        assert_eq!(store.get(id).expect("ride").status, RideStatus::Requested);
    }
}
