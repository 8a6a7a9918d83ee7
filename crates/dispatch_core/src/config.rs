//! Dispatch configuration resources.

use bevy_ecs::prelude::Resource;

/// Candidate search and offer fan-out configuration.
#[derive(Debug, Clone, Copy, Resource)]
pub struct MatchingConfig {
    /// Candidate search radius around the pickup point, in km.
    pub search_radius_km: f64,
    /// Maximum number of drivers offered one ride simultaneously.
    pub max_candidates: usize,
    /// How long a ride may stay unassigned before the system cancels it
    /// with "no drivers available".
    pub offer_timeout_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_radius_km: 10.0,
            max_candidates: 20,
            offer_timeout_secs: 30,
        }
    }
}

impl MatchingConfig {
    pub fn with_search_radius_km(mut self, radius_km: f64) -> Self {
        self.search_radius_km = radius_km;
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_offer_timeout_secs(mut self, secs: u64) -> Self {
        self.offer_timeout_secs = secs;
        self
    }
}

/// Rider cancellation charge policy.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CancellationConfig {
    /// Fraction of the fare estimate charged when cancelling after the
    /// driver has arrived (0.10 = 10%).
    pub arrived_charge_pct: f64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            arrived_charge_pct: 0.10,
        }
    }
}

impl CancellationConfig {
    pub fn with_arrived_charge_pct(mut self, pct: f64) -> Self {
        self.arrived_charge_pct = pct;
        self
    }
}

/// SOS escalation policy.
#[derive(Debug, Clone, Copy, Resource)]
pub struct EscalationConfig {
    /// Time an alert may sit in `active`/`acknowledged` before it is
    /// escalated, in seconds.
    pub sla_secs: u64,
    /// Radius for notifying nearby online drivers of a rider-triggered
    /// alert, in km.
    pub nearby_driver_radius_km: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            sla_secs: 5 * 60,
            nearby_driver_radius_km: 5.0,
        }
    }
}

impl EscalationConfig {
    pub fn with_sla_secs(mut self, secs: u64) -> Self {
        self.sla_secs = secs;
        self
    }

    pub fn with_nearby_driver_radius_km(mut self, radius_km: f64) -> Self {
        self.nearby_driver_radius_km = radius_km;
        self
    }
}
