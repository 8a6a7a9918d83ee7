//! Dispatch clock: ordered event queue and cancellable entity-keyed timers.
//!
//! All mutations flow through this queue: client commands are scheduled at
//! the current timestamp, timer-driven work (`MatchTimeout`,
//! `EscalationCheck`) in the future. Events at the same timestamp are
//! processed in scheduling order, which is what gives each ride's status
//! events a single total order.
//!
//! Timer kinds are keyed by their subject: re-arming a timer for the same
//! entity supersedes the outstanding one, and [DispatchClock::cancel_timer]
//! logically cancels it. A cancelled or superseded timer is skipped when it
//! surfaces; systems still re-check entity state at fire time (stale-timer
//! guard) since the store, not the clock, is authoritative.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use bevy_ecs::prelude::Resource;

use crate::alert::AlertId;
use crate::ride::RideId;

pub const ONE_SEC_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    RideRequested,
    DriverResponse,
    LocationUpdate,
    RideProgress,
    CancelRequest,
    RideMessage,
    SosTrigger,
    SosProgress,
    MatchTimeout,
    EscalationCheck,
}

impl EventKind {
    /// Timer kinds are keyed by subject and cancellable; command kinds are
    /// processed exactly once in FIFO order.
    pub fn is_timer(self) -> bool {
        matches!(self, EventKind::MatchTimeout | EventKind::EscalationCheck)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSubject {
    Ride(RideId),
    Alert(AlertId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    /// Scheduling order; ties on `timestamp` pop in FIFO order.
    pub seq: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (timestamp, seq).
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being processed; inserted by the engine before each
/// schedule run so systems can gate on it.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Default, Resource)]
pub struct DispatchClock {
    now: u64,
    next_seq: u64,
    events: BinaryHeap<Event>,
    /// Seq of the one outstanding timer per (kind, subject); events whose seq
    /// no longer matches were cancelled or superseded.
    timers: HashMap<(EventKind, EventSubject), u64>,
}

impl DispatchClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule a command event at the current timestamp.
    pub fn schedule_now(&mut self, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now, kind, subject);
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        debug_assert!(
            timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        if kind.is_timer() {
            debug_assert!(subject.is_some(), "timer events carry a subject");
            if let Some(key) = subject {
                self.timers.insert((kind, key), seq);
            }
        }
        self.events.push(Event {
            timestamp,
            seq,
            kind,
            subject,
        });
    }

    /// Arm (or re-arm, superseding) the entity's timer `delay_ms` from now.
    pub fn schedule_timer_in(&mut self, delay_ms: u64, kind: EventKind, subject: EventSubject) {
        debug_assert!(kind.is_timer(), "not a timer kind: {kind:?}");
        self.schedule_at(self.now + delay_ms, kind, Some(subject));
    }

    /// Logically cancel the outstanding timer for this entity, if any. The
    /// queued event is skipped when it surfaces.
    pub fn cancel_timer(&mut self, kind: EventKind, subject: EventSubject) {
        self.timers.remove(&(kind, subject));
    }

    /// Pop the next live event and advance `now` to its timestamp. Cancelled
    /// and superseded timer events are skipped silently.
    pub fn pop_next(&mut self) -> Option<Event> {
        loop {
            let event = self.events.pop()?;
            if let (true, Some(key)) = (event.kind.is_timer(), event.subject) {
                if self.timers.get(&(event.kind, key)) != Some(&event.seq) {
                    continue;
                }
                self.timers.remove(&(event.kind, key));
            }
            self.now = event.timestamp;
            return Some(event);
        }
    }

    /// Timestamp of the next live event, without popping it.
    pub fn next_event_time(&mut self) -> Option<u64> {
        loop {
            let event = *self.events.peek()?;
            if let (true, Some(key)) = (event.kind.is_timer(), event.subject) {
                if self.timers.get(&(event.kind, key)) != Some(&event.seq) {
                    self.events.pop();
                    continue;
                }
            }
            return Some(event.timestamp);
        }
    }

    /// Move the clock forward without processing anything. Used by the engine
    /// after draining all events due at or before `timestamp`.
    pub fn advance_to(&mut self, timestamp: u64) {
        self.now = self.now.max(timestamp);
    }

    pub fn is_empty(&mut self) -> bool {
        self.next_event_time().is_none()
    }
}
