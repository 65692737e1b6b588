//! Adapter for the remote metering API (Glowmarkt-compatible).

pub mod error;
pub mod glowmarkt;
pub mod types;

pub use error::ApiError;
pub use glowmarkt::{ClientOptions, GlowmarktClient, DEFAULT_APPLICATION_ID, DEFAULT_BASE_URL};
pub use types::{Credentials, DateParam, Entity, ReadingsQuery, Resource, DEFAULT_FUNCTION, DEFAULT_PERIOD};
