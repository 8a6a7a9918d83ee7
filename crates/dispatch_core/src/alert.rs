//! SOS alert records and the escalation status lifecycle.
//!
//! Alerts are an audit trail: they are created on trigger, mutated by status
//! updates and the escalation timer, and never deleted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ride::{RideId, UserId};
use crate::spatial::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SosSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SosStatus {
    Active,
    Acknowledged,
    Responding,
    Resolved,
    FalseAlarm,
    Cancelled,
    Escalated,
}

impl SosStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SosStatus::Resolved | SosStatus::FalseAlarm | SosStatus::Cancelled | SosStatus::Escalated
        )
    }
}

/// Legal alert transitions. `Escalated` is reachable only through the SLA
/// timer and `Cancelled` only by the triggering user; both restrictions are
/// enforced by the callers, this table covers the raw edges.
pub fn sos_transition_allowed(from: SosStatus, to: SosStatus) -> bool {
    use SosStatus::*;
    matches!(
        (from, to),
        (Active, Acknowledged)
            | (Active, Cancelled)
            | (Active, Escalated)
            | (Acknowledged, Responding)
            | (Acknowledged, Cancelled)
            | (Acknowledged, Escalated)
            | (Responding, Resolved)
            | (Responding, FalseAlarm)
    )
}

/// Client-supplied fields of a new alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosDraft {
    pub location: GeoPoint,
    pub severity: SosSeverity,
    /// Ride the alert relates to, if the user was mid-trip.
    pub ride: Option<RideId>,
}

/// Fan-out targets computed at trigger time and recorded on the alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SosFanout {
    /// Emergency contact numbers with notifications enabled.
    pub contact_numbers: Vec<String>,
    /// Online drivers near the trigger location (rider-triggered alerts only).
    pub nearby_drivers: Vec<UserId>,
    /// The other party of the associated ride, when that ride was active.
    pub counterparty: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    pub id: AlertId,
    pub user: UserId,
    pub ride: Option<RideId>,
    pub location: GeoPoint,
    pub severity: SosSeverity,
    pub status: SosStatus,
    pub fanout: SosFanout,
    pub triggered_at: u64,
    pub updated_at: u64,
    pub escalated_at: Option<u64>,
}

impl SosAlert {
    pub fn new(
        id: AlertId,
        user: UserId,
        draft: SosDraft,
        fanout: SosFanout,
        triggered_at: u64,
    ) -> Self {
        Self {
            id,
            user,
            ride: draft.ride,
            location: draft.location,
            severity: draft.severity,
            status: SosStatus::Active,
            fanout,
            triggered_at,
            updated_at: triggered_at,
            escalated_at: None,
        }
    }
}
