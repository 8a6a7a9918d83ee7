pub mod alert;
pub mod clock;
pub mod commands;
pub mod config;
pub mod contacts;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod events;
pub mod matching;
pub mod notifier;
pub mod presence;
pub mod pricing;
pub mod ride;
pub mod spatial;
pub mod state_machine;
pub mod store;
pub mod systems;
pub mod telemetry;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
