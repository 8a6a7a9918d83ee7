//! External notification collaborator (push/SMS).
//!
//! Delivery to humans is best-effort and never a precondition for state
//! progress: failures are logged and counted, not propagated.

use bevy_ecs::prelude::Resource;
use thiserror::Error;
use tracing::warn;

use crate::presence::Role;
use crate::ride::UserId;
use crate::telemetry::DispatchTelemetry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

pub trait Notifier: Send + Sync {
    fn notify_user(
        &self,
        user: UserId,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError>;

    fn notify_contacts(&self, numbers: &[String], message: &str) -> Result<(), NotifyError>;

    fn notify_broadcast(
        &self,
        role: Role,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Default collaborator that drops everything; deployments plug in a real
/// push/SMS gateway.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_user(
        &self,
        _user: UserId,
        _event: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_contacts(&self, _numbers: &[String], _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_broadcast(
        &self,
        _role: Role,
        _event: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Resource wrapper for the notifier trait object.
#[derive(Resource)]
pub struct NotifierResource(pub Box<dyn Notifier>);

impl NotifierResource {
    pub fn noop() -> Self {
        Self(Box::new(NoopNotifier))
    }
}

impl std::ops::Deref for NotifierResource {
    type Target = dyn Notifier;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Fire-and-forget wrapper: logs and counts a failure, never surfaces it.
pub fn best_effort(telemetry: &mut DispatchTelemetry, label: &str, result: Result<(), NotifyError>) {
    if let Err(err) = result {
        warn!(%err, label, "notification failed");
        telemetry.notifier_failures += 1;
    }
}
