pub mod config;
pub mod error;
pub mod helm;
pub mod kubectl;
pub mod manifest;
pub mod namespace;
pub mod readiness;
pub mod reconcile;
pub mod release;
pub mod repository;
pub mod runner;
pub mod secret;
pub mod verify;

#[cfg(test)]
mod fake;

pub use error::{DeployError, Result};
