//! Dispatch engine: advances the clock and routes events into the ECS.
//!
//! Clock progression and event routing happen here, outside systems. Each
//! step pops the next event from [DispatchClock], inserts it as
//! [CurrentEvent], then runs the schedule. [DispatchEngine] wraps the world
//! with the client-facing command surface: mutating commands validate
//! synchronously, enqueue, and are processed by [DispatchEngine::run_until_idle]
//! or [DispatchEngine::advance_to]; queries read the stores directly.

use std::sync::Arc;

use bevy_ecs::prelude::{Res, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;

use crate::alert::{AlertId, SosAlert, SosDraft, SosFanout, SosStatus};
use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::commands::{
    CancelCmd, DriverResponseCmd, LocationUpdateCmd, PendingCancellations, PendingDriverResponses,
    PendingLocationUpdates, PendingProgressUpdates, PendingRideMessages, PendingSosUpdates,
    RideMessageCmd, RideProgressCmd, SosProgressCmd,
};
use crate::config::{CancellationConfig, EscalationConfig, MatchingConfig};
use crate::contacts::{ContactDirectory, EmergencyContact};
use crate::coordination::RideChannels;
use crate::error::DispatchError;
use crate::events::{Authenticated, ClientEvent};
use crate::matching::{MatchingPolicy, MatchingPolicyResource, NearestFirst};
use crate::notifier::{Notifier, NotifierResource};
use crate::presence::{
    ConnectionId, Connections, Credential, EventSink, PresenceEntry, PresenceRegistry, Role,
};
use crate::pricing::{estimate_fare, PricingConfig};
use crate::ride::{Ride, RideDraft, RideId, RideStatus, UserId};
use crate::spatial::{DriverLocation, GeoPoint, LocationCache, LocationStore};
use crate::state_machine::{cancellation_charge, transition_allowed};
use crate::store::{AlertStore, AlertStoreResource, RideStore, RideStoreResource};
use crate::systems::{
    cancel::cancel_system, driver_response::driver_response_system,
    escalation_check::escalation_check_system, location_update::location_update_system,
    match_timeout::match_timeout_system, ride_message::ride_message_system,
    ride_progress::ride_progress_system, ride_request::ride_request_system,
    sos_progress::sos_progress_system, sos_trigger::sos_trigger_system,
};
use crate::telemetry::DispatchTelemetry;

// Condition functions for each event kind
fn is_ride_requested(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RideRequested)
        .unwrap_or(false)
}

fn is_driver_response(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DriverResponse)
        .unwrap_or(false)
}

fn is_location_update(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::LocationUpdate)
        .unwrap_or(false)
}

fn is_ride_progress(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RideProgress)
        .unwrap_or(false)
}

fn is_cancel_request(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::CancelRequest)
        .unwrap_or(false)
}

fn is_ride_message(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::RideMessage)
        .unwrap_or(false)
}

fn is_sos_trigger(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::SosTrigger)
        .unwrap_or(false)
}

fn is_sos_progress(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::SosProgress)
        .unwrap_or(false)
}

fn is_match_timeout(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::MatchTimeout)
        .unwrap_or(false)
}

fn is_escalation_check(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::EscalationCheck)
        .unwrap_or(false)
}

/// Runs one step: pops the next event, inserts it as [CurrentEvent], then
/// runs the schedule. Returns `false` when the clock is empty.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let event = match world.resource_mut::<DispatchClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Builds the default dispatch schedule. Systems are conditionally executed
/// based on event type to reduce overhead.
pub fn dispatch_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        ride_request_system.run_if(is_ride_requested),
        driver_response_system.run_if(is_driver_response),
        location_update_system.run_if(is_location_update),
        ride_progress_system.run_if(is_ride_progress),
        cancel_system.run_if(is_cancel_request),
        ride_message_system.run_if(is_ride_message),
        sos_trigger_system.run_if(is_sos_trigger),
        sos_progress_system.run_if(is_sos_progress),
        match_timeout_system.run_if(is_match_timeout),
        escalation_check_system.run_if(is_escalation_check),
    ));
    schedule
}

pub struct DispatchEngineBuilder {
    ride_store: Box<dyn RideStore>,
    alert_store: Box<dyn AlertStore>,
    location_store: Box<dyn LocationStore>,
    notifier: Box<dyn Notifier>,
    matching_policy: Box<dyn MatchingPolicy>,
    matching: MatchingConfig,
    cancellation: CancellationConfig,
    escalation: EscalationConfig,
    pricing: PricingConfig,
}

impl Default for DispatchEngineBuilder {
    fn default() -> Self {
        Self {
            ride_store: Box::new(crate::store::InMemoryRideStore::new()),
            alert_store: Box::new(crate::store::InMemoryAlertStore::new()),
            location_store: Box::new(crate::spatial::InMemoryLocationStore::new()),
            notifier: Box::new(crate::notifier::NoopNotifier),
            matching_policy: Box::new(NearestFirst),
            matching: MatchingConfig::default(),
            cancellation: CancellationConfig::default(),
            escalation: EscalationConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

impl DispatchEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ride_store(mut self, store: Box<dyn RideStore>) -> Self {
        self.ride_store = store;
        self
    }

    pub fn with_alert_store(mut self, store: Box<dyn AlertStore>) -> Self {
        self.alert_store = store;
        self
    }

    pub fn with_location_store(mut self, store: Box<dyn LocationStore>) -> Self {
        self.location_store = store;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_matching_policy(mut self, policy: Box<dyn MatchingPolicy>) -> Self {
        self.matching_policy = policy;
        self
    }

    pub fn with_matching_config(mut self, config: MatchingConfig) -> Self {
        self.matching = config;
        self
    }

    pub fn with_cancellation_config(mut self, config: CancellationConfig) -> Self {
        self.cancellation = config;
        self
    }

    pub fn with_escalation_config(mut self, config: EscalationConfig) -> Self {
        self.escalation = config;
        self
    }

    pub fn with_pricing_config(mut self, config: PricingConfig) -> Self {
        self.pricing = config;
        self
    }

    pub fn build(self) -> DispatchEngine {
        let mut world = World::new();
        world.insert_resource(DispatchClock::default());
        world.insert_resource(DispatchTelemetry::default());
        world.insert_resource(RideStoreResource(self.ride_store));
        world.insert_resource(AlertStoreResource(self.alert_store));
        world.insert_resource(LocationCache(self.location_store));
        world.insert_resource(NotifierResource(self.notifier));
        world.insert_resource(MatchingPolicyResource(self.matching_policy));
        world.insert_resource(PresenceRegistry::in_memory());
        world.insert_resource(Connections::default());
        world.insert_resource(RideChannels::default());
        world.insert_resource(ContactDirectory::default());
        world.insert_resource(self.matching);
        world.insert_resource(self.cancellation);
        world.insert_resource(self.escalation);
        world.insert_resource(self.pricing);
        world.insert_resource(PendingDriverResponses::default());
        world.insert_resource(PendingLocationUpdates::default());
        world.insert_resource(PendingProgressUpdates::default());
        world.insert_resource(PendingCancellations::default());
        world.insert_resource(PendingRideMessages::default());
        world.insert_resource(PendingSosUpdates::default());
        DispatchEngine {
            world,
            schedule: dispatch_schedule(),
        }
    }
}

pub struct DispatchEngine {
    world: World,
    schedule: Schedule,
}

impl Default for DispatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchEngine {
    pub fn new() -> Self {
        DispatchEngineBuilder::default().build()
    }

    pub fn builder() -> DispatchEngineBuilder {
        DispatchEngineBuilder::default()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn now(&self) -> u64 {
        self.world.resource::<DispatchClock>().now()
    }

    // ----- connection lifecycle -----

    /// Opens an unauthenticated connection around the given outbound sink.
    pub fn connect(&mut self, channel: Arc<dyn EventSink>) -> ConnectionId {
        self.world.resource_mut::<Connections>().open(channel)
    }

    /// Binds an identity and role to a connection. Joins the personal
    /// channel; drivers additionally become visible to candidate fan-out.
    pub fn authenticate(
        &mut self,
        conn: ConnectionId,
        credential: Credential,
    ) -> Result<(), DispatchError> {
        if credential.role == Role::Driver && credential.vehicle_type.is_none() {
            return Err(DispatchError::Validation(
                "drivers must declare a vehicle type".into(),
            ));
        }
        let channel = {
            let connections = self.world.resource::<Connections>();
            let Some(state) = connections.get(conn) else {
                return Err(DispatchError::NotFound("connection"));
            };
            state.channel.clone()
        };
        self.world
            .resource_mut::<Connections>()
            .bind(conn, credential.user);

        // Resync: a party reconnecting mid-ride picks its ride back up.
        let current_ride = self
            .world
            .resource::<RideStoreResource>()
            .active_ride_for(credential.user)
            .filter(|ride| match credential.role {
                Role::Rider => ride.rider == credential.user,
                Role::Driver => ride.driver == Some(credential.user),
                Role::Admin => false,
            })
            .map(|ride| ride.id);

        let vehicle_type = match credential.role {
            Role::Driver => credential.vehicle_type,
            _ => None,
        };
        self.world
            .resource_mut::<PresenceRegistry>()
            .insert(PresenceEntry {
                user: credential.user,
                role: credential.role,
                vehicle_type,
                channel: channel.clone(),
                current_ride,
                available: true,
            });
        channel.deliver(ClientEvent::Authenticated(Authenticated {
            user: credential.user,
            role: credential.role,
        }));
        Ok(())
    }

    /// Drops the connection, its presence entry, and (for drivers) the
    /// location-cache entry. Persisted ride state is untouched.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(state) = self.world.resource_mut::<Connections>().close(conn) else {
            return;
        };
        let Some(user) = state.user else {
            return;
        };
        let removed = self.world.resource_mut::<PresenceRegistry>().remove(user);
        if removed.map(|entry| entry.role == Role::Driver).unwrap_or(false) {
            self.world.resource_mut::<LocationCache>().remove(user);
        }
    }

    /// Drivers toggle this off to stop receiving offers without
    /// disconnecting.
    pub fn set_driver_availability(
        &mut self,
        driver: UserId,
        available: bool,
    ) -> Result<(), DispatchError> {
        let mut presence = self.world.resource_mut::<PresenceRegistry>();
        match presence.get_mut(driver) {
            Some(entry) if entry.role == Role::Driver => {
                entry.available = available;
                Ok(())
            }
            _ => Err(DispatchError::NotFound("driver presence")),
        }
    }

    /// Explicitly joins one of the ride's parties to its channel (used after
    /// a reconnect to resume in-trip traffic).
    pub fn join_ride_channel(&mut self, user: UserId, ride: RideId) -> Result<(), DispatchError> {
        let ride = self.ride(ride)?;
        if !ride.is_party(user) {
            return Err(DispatchError::Authorization(
                "only the ride's parties may join its channel".into(),
            ));
        }
        self.world
            .resource_mut::<RideChannels>()
            .join(ride.id, user);
        Ok(())
    }

    // ----- mutating commands -----

    /// Creates the ride and queues dispatch. Fan-out and the no-driver timer
    /// run on the next [Self::run_until_idle].
    pub fn request_ride(&mut self, rider: UserId, draft: RideDraft) -> Result<Ride, DispatchError> {
        if !draft.pickup.is_valid() || !draft.destination.is_valid() {
            return Err(DispatchError::Validation(
                "pickup and destination must be valid coordinates".into(),
            ));
        }
        if self
            .world
            .resource::<RideStoreResource>()
            .active_ride_for(rider)
            .is_some()
        {
            return Err(DispatchError::Conflict(
                "user already has an active ride".into(),
            ));
        }
        let pricing = *self.world.resource::<PricingConfig>();
        let estimate = estimate_fare(&pricing, draft.pickup, draft.destination);
        let ride = Ride::new(RideId::new(), rider, draft, estimate, self.now());
        self.world
            .resource_mut::<RideStoreResource>()
            .create(ride.clone())
            .map_err(|err| DispatchError::from_store(err, "ride"))?;
        self.world.resource_mut::<DispatchTelemetry>().rides_requested += 1;
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::RideRequested, Some(EventSubject::Ride(ride.id)));
        Ok(ride)
    }

    /// Queues a driver's accept or reject of an offered ride. A losing
    /// accept surfaces to the driver as a `ride_unavailable` event.
    pub fn driver_response(
        &mut self,
        driver: UserId,
        ride: RideId,
        accept: bool,
    ) -> Result<(), DispatchError> {
        self.ride(ride)?;
        let is_driver = self
            .world
            .resource::<PresenceRegistry>()
            .get(driver)
            .map(|entry| entry.role == Role::Driver)
            .unwrap_or(false);
        if !is_driver {
            return Err(DispatchError::Authorization(
                "responses require a connected driver".into(),
            ));
        }
        self.world
            .resource_mut::<PendingDriverResponses>()
            .0
            .push_back(DriverResponseCmd {
                driver,
                ride,
                accept,
            });
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::DriverResponse, None);
        Ok(())
    }

    /// Queues a driver position fix. Older fixes than the cached one are
    /// dropped (latest wins).
    pub fn location_update(
        &mut self,
        driver: UserId,
        point: GeoPoint,
        recorded_at: u64,
    ) -> Result<(), DispatchError> {
        let Some(cell) = point.try_cell() else {
            return Err(DispatchError::Validation(
                "location must be a valid coordinate".into(),
            ));
        };
        let is_driver = self
            .world
            .resource::<PresenceRegistry>()
            .get(driver)
            .map(|entry| entry.role == Role::Driver)
            .unwrap_or(false);
        if !is_driver {
            return Err(DispatchError::Authorization(
                "location updates require a connected driver".into(),
            ));
        }
        self.world
            .resource_mut::<PendingLocationUpdates>()
            .0
            .push_back(LocationUpdateCmd {
                driver,
                location: DriverLocation {
                    point,
                    cell,
                    recorded_at,
                },
            });
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::LocationUpdate, None);
        Ok(())
    }

    /// Queues a driver-reported trip progress transition
    /// (`driver_arriving`, `driver_arrived`, `in_progress`, `completed`).
    pub fn ride_status_update(
        &mut self,
        actor: UserId,
        ride: RideId,
        to: RideStatus,
        actual_distance_km: Option<f64>,
    ) -> Result<(), DispatchError> {
        if !matches!(
            to,
            RideStatus::DriverArriving
                | RideStatus::DriverArrived
                | RideStatus::InProgress
                | RideStatus::Completed
        ) {
            return Err(DispatchError::Validation(format!(
                "{to:?} is not a reportable trip status"
            )));
        }
        let current = self.ride(ride)?;
        if current.driver != Some(actor) {
            return Err(DispatchError::Authorization(
                "only the assigned driver reports trip progress".into(),
            ));
        }
        if !transition_allowed(current.status, to) {
            return Err(DispatchError::InvalidTransition(format!(
                "{:?} -> {to:?}",
                current.status
            )));
        }
        self.world
            .resource_mut::<PendingProgressUpdates>()
            .0
            .push_back(RideProgressCmd {
                actor,
                ride,
                to,
                actual_distance_km,
            });
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::RideProgress, None);
        Ok(())
    }

    /// Queues a cancellation by either party. Charges follow the
    /// cancellation policy; a ride in progress refuses outright.
    pub fn cancel_ride(
        &mut self,
        actor: UserId,
        ride: RideId,
        reason: impl Into<String>,
    ) -> Result<(), DispatchError> {
        let current = self.ride(ride)?;
        if !current.is_party(actor) {
            return Err(DispatchError::Authorization(
                "only the ride's parties may cancel it".into(),
            ));
        }
        if current.rider == actor {
            let config = *self.world.resource::<CancellationConfig>();
            cancellation_charge(current.status, current.fare_estimate, &config)?;
        } else if !matches!(
            current.status,
            RideStatus::DriverAssigned | RideStatus::DriverArriving | RideStatus::DriverArrived
        ) {
            return Err(DispatchError::InvalidTransition(format!(
                "driver cannot cancel a ride in {:?}",
                current.status
            )));
        }
        self.world
            .resource_mut::<PendingCancellations>()
            .0
            .push_back(CancelCmd {
                actor,
                ride,
                reason: reason.into(),
            });
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::CancelRequest, None);
        Ok(())
    }

    /// Queues an in-trip message to the per-ride channel.
    pub fn send_ride_message(
        &mut self,
        from: UserId,
        ride: RideId,
        text: impl Into<String>,
    ) -> Result<(), DispatchError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DispatchError::Validation("message text is empty".into()));
        }
        let current = self.ride(ride)?;
        if !current.is_party(from) {
            return Err(DispatchError::Authorization(
                "only the ride's parties may message its channel".into(),
            ));
        }
        self.world
            .resource_mut::<PendingRideMessages>()
            .0
            .push_back(RideMessageCmd { from, ride, text });
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::RideMessage, None);
        Ok(())
    }

    /// Persists a new alert and queues its fan-out. Not idempotent: every
    /// call creates a fresh alert; de-duplication is the caller's concern.
    pub fn trigger_sos(&mut self, user: UserId, draft: SosDraft) -> Result<SosAlert, DispatchError> {
        if !draft.location.is_valid() {
            return Err(DispatchError::Validation(
                "alert location must be a valid coordinate".into(),
            ));
        }
        let fanout = self.compute_sos_fanout(user, &draft)?;
        let alert = SosAlert::new(AlertId::new(), user, draft, fanout, self.now());
        self.world
            .resource_mut::<AlertStoreResource>()
            .create(alert.clone())
            .map_err(|err| DispatchError::from_store(err, "alert"))?;
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::SosTrigger, Some(EventSubject::Alert(alert.id)));
        Ok(alert)
    }

    /// Queues an alert status update. The triggering user may cancel an open
    /// alert; everything else is an admin operation. Escalation is
    /// timer-driven and cannot be requested.
    pub fn update_sos(
        &mut self,
        actor: UserId,
        alert: AlertId,
        to: SosStatus,
    ) -> Result<(), DispatchError> {
        if to == SosStatus::Escalated {
            return Err(DispatchError::Validation(
                "escalation is timer-driven and cannot be requested".into(),
            ));
        }
        let current = self.alert(alert)?;
        if to == SosStatus::Cancelled {
            if current.user != actor {
                return Err(DispatchError::Authorization(
                    "only the triggering user may cancel an alert".into(),
                ));
            }
        } else {
            let is_admin = self
                .world
                .resource::<PresenceRegistry>()
                .get(actor)
                .map(|entry| entry.role == Role::Admin)
                .unwrap_or(false);
            if !is_admin {
                return Err(DispatchError::Authorization(
                    "alert handling requires an admin".into(),
                ));
            }
        }
        if !crate::alert::sos_transition_allowed(current.status, to) {
            return Err(DispatchError::InvalidTransition(format!(
                "{:?} -> {to:?}",
                current.status
            )));
        }
        self.world
            .resource_mut::<PendingSosUpdates>()
            .0
            .push_back(SosProgressCmd { actor, alert, to });
        self.world
            .resource_mut::<DispatchClock>()
            .schedule_now(EventKind::SosProgress, None);
        Ok(())
    }

    pub fn set_emergency_contacts(
        &mut self,
        user: UserId,
        contacts: Vec<EmergencyContact>,
    ) -> Result<(), DispatchError> {
        if contacts.iter().any(|c| c.number.trim().is_empty()) {
            return Err(DispatchError::Validation(
                "contact numbers must not be empty".into(),
            ));
        }
        self.world
            .resource_mut::<ContactDirectory>()
            .set(user, contacts);
        Ok(())
    }

    // ----- queries -----

    pub fn ride(&self, id: RideId) -> Result<Ride, DispatchError> {
        self.world
            .resource::<RideStoreResource>()
            .get(id)
            .map_err(|err| DispatchError::from_store(err, "ride"))
    }

    pub fn active_ride(&self, user: UserId) -> Option<Ride> {
        self.world
            .resource::<RideStoreResource>()
            .active_ride_for(user)
    }

    pub fn ride_history(&self, user: UserId) -> Vec<Ride> {
        self.world.resource::<RideStoreResource>().history_for(user)
    }

    pub fn alert(&self, id: AlertId) -> Result<SosAlert, DispatchError> {
        self.world
            .resource::<AlertStoreResource>()
            .get(id)
            .map_err(|err| DispatchError::from_store(err, "alert"))
    }

    pub fn emergency_contacts(&self, user: UserId) -> Vec<EmergencyContact> {
        self.world.resource::<ContactDirectory>().get(user).to_vec()
    }

    // ----- event loop -----

    /// Processes every event due at the current timestamp. Returns the
    /// number of steps executed.
    pub fn run_until_idle(&mut self) -> usize {
        let now = self.now();
        self.advance_to(now)
    }

    /// Processes every event due at or before `timestamp`, then moves the
    /// clock there. Timers due in the window fire in order.
    pub fn advance_to(&mut self, timestamp: u64) -> usize {
        let mut steps = 0;
        loop {
            let due = self
                .world
                .resource_mut::<DispatchClock>()
                .next_event_time()
                .map(|t| t <= timestamp)
                .unwrap_or(false);
            if !due || !run_next_event(&mut self.world, &mut self.schedule) {
                break;
            }
            steps += 1;
        }
        self.world
            .resource_mut::<DispatchClock>()
            .advance_to(timestamp);
        steps
    }

    // ----- internals -----

    /// Target lists computed at trigger time and recorded on the alert.
    fn compute_sos_fanout(
        &self,
        user: UserId,
        draft: &SosDraft,
    ) -> Result<SosFanout, DispatchError> {
        let contact_numbers = self
            .world
            .resource::<ContactDirectory>()
            .enabled_numbers(user);

        let associated_ride = match draft.ride {
            Some(ride_id) => {
                let ride = self.ride(ride_id)?;
                if !ride.is_party(user) {
                    return Err(DispatchError::Authorization(
                        "alert may only reference the user's own ride".into(),
                    ));
                }
                Some(ride)
            }
            None => None,
        };

        let presence = self.world.resource::<PresenceRegistry>();
        let triggered_by_rider = match presence.get(user) {
            Some(entry) => entry.role == Role::Rider,
            None => associated_ride
                .as_ref()
                .map(|ride| ride.rider == user)
                .unwrap_or(true),
        };

        let nearby_drivers = if triggered_by_rider {
            let radius = self
                .world
                .resource::<EscalationConfig>()
                .nearby_driver_radius_km;
            self.world
                .resource::<LocationCache>()
                .nearby(draft.location, radius)
                .into_iter()
                .map(|(driver, _)| driver)
                .filter(|driver| {
                    *driver != user
                        && presence
                            .get(*driver)
                            .map(|entry| entry.role == Role::Driver)
                            .unwrap_or(false)
                })
                .collect()
        } else {
            Vec::new()
        };

        let counterparty = associated_ride.as_ref().and_then(|ride| {
            if ride.status.is_terminal() {
                return None;
            }
            if ride.rider == user {
                ride.driver
            } else {
                Some(ride.rider)
            }
        });

        Ok(SosFanout {
            contact_numbers,
            nearby_drivers,
            counterparty,
        })
    }
}
