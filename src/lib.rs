//! Crate entrypoint wiring together the API client, reconciler, and resource kinds.

pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod reconcile;
pub mod resources;
pub mod technitium;
pub mod validation;

pub use config::ConnectionConfig;
pub use error::AppError;
pub use reconcile::{Outcome, Reconciler, Resource, State};
pub use technitium::{DnsApi, TechnitiumClient};
