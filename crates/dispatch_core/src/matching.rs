//! Candidate search and ranking for ride offers.
//!
//! The search runs over the location cache and presence registry: online,
//! available drivers of the requested vehicle type within the configured
//! radius of the pickup, minus drivers excluded by an earlier assignment
//! episode. Ranking sits behind [MatchingPolicy] so a deployment can swap
//! in a smarter scorer; the default offers nearest-first.

use bevy_ecs::prelude::Resource;

use crate::config::MatchingConfig;
use crate::presence::{PresenceRegistry, Role};
use crate::ride::{Ride, UserId};
use crate::spatial::{GeoPoint, LocationCache};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub driver: UserId,
    pub distance_km: f64,
}

pub trait MatchingPolicy: Send + Sync {
    /// Orders eligible candidates, best offer first. The caller applies the
    /// fan-out cap afterwards.
    fn rank(&self, pickup: GeoPoint, candidates: Vec<Candidate>) -> Vec<Candidate>;
}

/// Default policy: nearest driver first.
#[derive(Debug, Default)]
pub struct NearestFirst;

impl MatchingPolicy for NearestFirst {
    fn rank(&self, _pickup: GeoPoint, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        candidates
    }
}

/// Resource wrapper for the matching policy trait object.
#[derive(Resource)]
pub struct MatchingPolicyResource(pub Box<dyn MatchingPolicy>);

impl MatchingPolicyResource {
    pub fn new(policy: Box<dyn MatchingPolicy>) -> Self {
        Self(policy)
    }
}

impl std::ops::Deref for MatchingPolicyResource {
    type Target = dyn MatchingPolicy;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Eligible candidates for one ride, ranked and capped.
pub fn find_candidates(
    location: &LocationCache,
    presence: &PresenceRegistry,
    policy: &MatchingPolicyResource,
    config: &MatchingConfig,
    ride: &Ride,
) -> Vec<Candidate> {
    let eligible: Vec<Candidate> = location
        .nearby(ride.pickup, config.search_radius_km)
        .into_iter()
        .filter_map(|(driver, distance_km)| {
            let entry = presence.get(driver)?;
            let is_candidate = entry.role == Role::Driver
                && entry.available
                && entry.current_ride.is_none()
                && entry.vehicle_type == Some(ride.vehicle_type)
                && !ride.excluded_drivers.contains(&driver);
            is_candidate.then_some(Candidate {
                driver,
                distance_km,
            })
        })
        .collect();

    let mut ranked = policy.rank(ride.pickup, eligible);
    ranked.truncate(config.max_candidates);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_first_orders_by_distance() {
        let policy = NearestFirst;
        let a = UserId::new();
        let b = UserId::new();
        let ranked = policy.rank(
            GeoPoint::new(52.52, 13.405),
            vec![
                Candidate {
                    driver: a,
                    distance_km: 3.2,
                },
                Candidate {
                    driver: b,
                    distance_km: 0.8,
                },
            ],
        );
        assert_eq!(ranked[0].driver, b);
        assert_eq!(ranked[1].driver, a);
    }
}
