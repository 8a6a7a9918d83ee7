//! Simple pricing: fare estimates at request time, actuals at completion.

use bevy_ecs::prelude::Resource;

use crate::spatial::{haversine_km, GeoPoint};

#[derive(Debug, Clone, Copy, Resource)]
pub struct PricingConfig {
    /// Base fare in currency units (e.g., dollars).
    pub base_fare: f64,
    /// Per-kilometer rate in currency units.
    pub per_km_rate: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_fare: 2.50,
            per_km_rate: 1.50,
        }
    }
}

/// Fare for a known trip distance.
///
/// Formula: `fare = base_fare + (distance_km * per_km_rate)`
pub fn fare_for_distance(config: &PricingConfig, distance_km: f64) -> f64 {
    config.base_fare + (distance_km * config.per_km_rate)
}

/// Fare estimate at request time, from the straight-line pickup-to-destination
/// distance. The actual fare is recomputed at completion from the distance
/// the driver reports.
pub fn estimate_fare(config: &PricingConfig, pickup: GeoPoint, destination: GeoPoint) -> f64 {
    fare_for_distance(config, haversine_km(pickup, destination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fare_includes_base_and_distance() {
        let config = PricingConfig::default();
        let pickup = GeoPoint::new(52.52, 13.405);
        let destination = GeoPoint::new(52.53, 13.42);

        let fare = estimate_fare(&config, pickup, destination);
        assert!(fare >= config.base_fare, "fare should be at least base fare");

        let distance = haversine_km(pickup, destination);
        let expected = config.base_fare + (distance * config.per_km_rate);
        assert!((fare - expected).abs() < 0.01, "fare calculation should match formula");
    }

    #[test]
    fn zero_distance_is_base_fare_only() {
        let config = PricingConfig::default();
        assert_eq!(fare_for_distance(&config, 0.0), config.base_fare);
    }
}
