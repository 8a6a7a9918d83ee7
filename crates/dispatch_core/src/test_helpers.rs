//! Recording doubles for tests: buffered client sinks, a recording
//! notifier, and an always-unavailable ride store.

use std::sync::{Arc, Mutex};

use crate::events::ClientEvent;
use crate::notifier::{Notifier, NotifyError};
use crate::presence::{EventSink, Role};
use crate::ride::{Ride, RideId, RideStatus, UserId};
use crate::store::{RideFields, RideStore, StoreError};

/// Buffers everything delivered to one connection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of everything delivered so far.
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().expect("sink lock").clone()
    }

    /// Drains the buffer.
    pub fn take(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.events.lock().expect("sink lock"))
    }
}

impl EventSink for RecordingSink {
    fn deliver(&self, event: ClientEvent) {
        self.events.lock().expect("sink lock").push(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierCall {
    User {
        user: UserId,
        event: String,
    },
    Contacts {
        numbers: Vec<String>,
        message: String,
    },
    Broadcast {
        role: Role,
        event: String,
    },
}

/// Records every notifier call; optionally fails them all to exercise the
/// best-effort path.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Arc<Mutex<Vec<NotifierCall>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            fail: true,
        }
    }

    /// Shared handle to the recorded calls, usable after the notifier has
    /// been boxed into the engine.
    pub fn calls_handle(&self) -> Arc<Mutex<Vec<NotifierCall>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: NotifierCall) -> Result<(), NotifyError> {
        self.calls.lock().expect("notifier lock").push(call);
        if self.fail {
            Err(NotifyError::Unavailable("test notifier down".into()))
        } else {
            Ok(())
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify_user(
        &self,
        user: UserId,
        event: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.record(NotifierCall::User {
            user,
            event: event.to_string(),
        })
    }

    fn notify_contacts(&self, numbers: &[String], message: &str) -> Result<(), NotifyError> {
        self.record(NotifierCall::Contacts {
            numbers: numbers.to_vec(),
            message: message.to_string(),
        })
    }

    fn notify_broadcast(
        &self,
        role: Role,
        event: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.record(NotifierCall::Broadcast {
            role,
            event: event.to_string(),
        })
    }
}

/// Ride store whose every operation reports the upstream as unreachable.
#[derive(Debug, Default)]
pub struct UnavailableRideStore;

impl RideStore for UnavailableRideStore {
    fn create(&mut self, _ride: Ride) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    fn get(&self, _id: RideId) -> Result<Ride, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    fn set_if(
        &mut self,
        _id: RideId,
        _expected: RideStatus,
        _status: RideStatus,
        _fields: RideFields,
        _now: u64,
    ) -> Result<Ride, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    fn active_ride_for(&self, _user: UserId) -> Option<Ride> {
        None
    }

    fn history_for(&self, _user: UserId) -> Vec<Ride> {
        Vec::new()
    }
}
