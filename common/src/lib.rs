//! Common code shared between `fire_client` and the mock services in its tests.
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
