//! Emergency contact directory, read by the SOS fan-out.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::ride::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub number: String,
    pub notifications_enabled: bool,
}

#[derive(Debug, Default, Resource)]
pub struct ContactDirectory {
    by_user: HashMap<UserId, Vec<EmergencyContact>>,
}

impl ContactDirectory {
    pub fn set(&mut self, user: UserId, contacts: Vec<EmergencyContact>) {
        self.by_user.insert(user, contacts);
    }

    pub fn get(&self, user: UserId) -> &[EmergencyContact] {
        self.by_user.get(&user).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Numbers of the user's contacts that opted into notifications.
    pub fn enabled_numbers(&self, user: UserId) -> Vec<String> {
        self.get(user)
            .iter()
            .filter(|contact| contact.notifications_enabled)
            .map(|contact| contact.number.clone())
            .collect()
    }
}
