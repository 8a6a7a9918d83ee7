//! Presence registry: which identities hold a live connection and the
//! channel to reach them.
//!
//! Presence is a process-local, best-effort cache, never a source of truth:
//! it starts empty on restart and repopulates as clients reconnect.
//! Disconnection removes the entry and the driver's location-cache entry; it
//! never touches persisted ride state.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::ClientEvent;
use crate::ride::{RideId, UserId, VehicleType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Credential presented on the authenticate exchange. Verification of the
/// token itself is an external concern; this layer validates the shape and
/// binds the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub user: UserId,
    pub role: Role,
    /// Required for drivers; ignored for other roles.
    pub vehicle_type: Option<VehicleType>,
}

/// Outbound half of a client connection. The in-memory sink used in tests
/// buffers events; a real deployment hands in a socket-backed sink.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: ClientEvent);
}

#[derive(Clone)]
pub struct PresenceEntry {
    pub user: UserId,
    pub role: Role,
    pub vehicle_type: Option<VehicleType>,
    pub channel: Arc<dyn EventSink>,
    /// Ride this identity is currently attached to, if any.
    pub current_ride: Option<RideId>,
    /// Drivers toggle this off to stop receiving offers without
    /// disconnecting.
    pub available: bool,
}

impl std::fmt::Debug for PresenceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceEntry")
            .field("user", &self.user)
            .field("role", &self.role)
            .field("vehicle_type", &self.vehicle_type)
            .field("current_ride", &self.current_ride)
            .field("available", &self.available)
            .finish()
    }
}

/// Swappable presence store (in-memory default) so a multi-process
/// deployment can back it with a shared cache without changing call sites.
pub trait PresenceStore: Send + Sync {
    fn insert(&mut self, entry: PresenceEntry);

    fn remove(&mut self, user: UserId) -> Option<PresenceEntry>;

    fn get(&self, user: UserId) -> Option<&PresenceEntry>;

    fn get_mut(&mut self, user: UserId) -> Option<&mut PresenceEntry>;

    fn users_with_role(&self, role: Role) -> Vec<UserId>;
}

#[derive(Default)]
pub struct InMemoryPresenceStore {
    entries: HashMap<UserId, PresenceEntry>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceStore for InMemoryPresenceStore {
    fn insert(&mut self, entry: PresenceEntry) {
        self.entries.insert(entry.user, entry);
    }

    fn remove(&mut self, user: UserId) -> Option<PresenceEntry> {
        self.entries.remove(&user)
    }

    fn get(&self, user: UserId) -> Option<&PresenceEntry> {
        self.entries.get(&user)
    }

    fn get_mut(&mut self, user: UserId) -> Option<&mut PresenceEntry> {
        self.entries.get_mut(&user)
    }

    fn users_with_role(&self, role: Role) -> Vec<UserId> {
        self.entries
            .values()
            .filter(|entry| entry.role == role)
            .map(|entry| entry.user)
            .collect()
    }
}

/// Resource wrapper for the presence store trait object.
#[derive(Resource)]
pub struct PresenceRegistry(pub Box<dyn PresenceStore>);

impl PresenceRegistry {
    pub fn in_memory() -> Self {
        Self(Box::new(InMemoryPresenceStore::new()))
    }
}

impl std::ops::Deref for PresenceRegistry {
    type Target = dyn PresenceStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for PresenceRegistry {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

/// Live connections, authenticated or not. Keys are connection ids handed
/// out by the engine; the bound user is set by the authenticate exchange.
#[derive(Default, Resource)]
pub struct Connections {
    entries: HashMap<ConnectionId, ConnectionState>,
}

pub struct ConnectionState {
    pub channel: Arc<dyn EventSink>,
    pub user: Option<UserId>,
}

impl Connections {
    pub fn open(&mut self, channel: Arc<dyn EventSink>) -> ConnectionId {
        let id = ConnectionId::new();
        self.entries.insert(id, ConnectionState { channel, user: None });
        id
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionState> {
        self.entries.get(&id)
    }

    pub fn bind(&mut self, id: ConnectionId, user: UserId) -> bool {
        match self.entries.get_mut(&id) {
            Some(state) => {
                state.user = Some(user);
                true
            }
            None => false,
        }
    }

    pub fn close(&mut self, id: ConnectionId) -> Option<ConnectionState> {
        self.entries.remove(&id)
    }
}
