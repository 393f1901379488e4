//! Technitium DNS Server HTTP API access.

pub mod client;
pub mod types;

pub use client::{DnsApi, TechnitiumClient};
pub use types::{ApiCall, ApiResponse, ApiStatus, HttpMethod};
