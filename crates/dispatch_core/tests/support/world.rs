#![allow(dead_code)]

use std::sync::Arc;

use dispatch_core::engine::DispatchEngine;
use dispatch_core::presence::{ConnectionId, Credential, Role};
use dispatch_core::ride::{RideDraft, UserId, VehicleType};
use dispatch_core::spatial::GeoPoint;
use dispatch_core::test_helpers::RecordingSink;

/// Base coordinate for test geometry: Berlin, Germany (approx).
pub const BASE: GeoPoint = GeoPoint {
    lat: 52.52,
    lng: 13.405,
};

/// Offset from [BASE] in degrees; 0.01 lat is roughly 1.1 km.
pub fn point(dlat: f64, dlng: f64) -> GeoPoint {
    GeoPoint::new(BASE.lat + dlat, BASE.lng + dlng)
}

pub fn draft_to(destination: GeoPoint) -> RideDraft {
    RideDraft {
        pickup: BASE,
        destination,
        vehicle_type: VehicleType::Economy,
    }
}

pub fn economy_draft() -> RideDraft {
    draft_to(point(0.02, 0.02))
}

/// One connected identity with its recording sink.
pub struct Client {
    pub user: UserId,
    pub conn: ConnectionId,
    pub sink: Arc<RecordingSink>,
}

fn connect(engine: &mut DispatchEngine, credential: Credential) -> Client {
    let sink = RecordingSink::new();
    let conn = engine.connect(sink.clone());
    let user = credential.user;
    engine
        .authenticate(conn, credential)
        .expect("authenticate test client");
    Client { user, conn, sink }
}

pub fn connect_rider(engine: &mut DispatchEngine) -> Client {
    connect(
        engine,
        Credential {
            user: UserId::new(),
            role: Role::Rider,
            vehicle_type: None,
        },
    )
}

pub fn connect_admin(engine: &mut DispatchEngine) -> Client {
    connect(
        engine,
        Credential {
            user: UserId::new(),
            role: Role::Admin,
            vehicle_type: None,
        },
    )
}

/// Connects a driver and announces a position, leaving it eligible for
/// offers.
pub fn connect_driver_at(
    engine: &mut DispatchEngine,
    vehicle_type: VehicleType,
    at: GeoPoint,
) -> Client {
    let client = connect(
        engine,
        Credential {
            user: UserId::new(),
            role: Role::Driver,
            vehicle_type: Some(vehicle_type),
        },
    );
    let now = engine.now();
    engine
        .location_update(client.user, at, now)
        .expect("announce driver location");
    engine.run_until_idle();
    client.sink.take();
    client
}

pub fn connect_economy_driver(engine: &mut DispatchEngine) -> Client {
    connect_driver_at(engine, VehicleType::Economy, point(0.001, 0.001))
}
