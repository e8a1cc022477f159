use std::time::Duration;

pub mod error;
pub mod types;
pub mod config;

pub use error::{AuthError, EncodedField, Result};
pub use types::*;
pub use config::*;

/// Timing policy shared by the authentication components.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// How long an issued challenge stays valid.
    pub challenge_ttl: Duration,
    /// Lifetime of an access token.
    pub token_ttl: Duration,
    /// Upper bound on any single storage call.
    pub storage_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(120),
            token_ttl: Duration::from_secs(300),
            storage_timeout: Duration::from_secs(5),
        }
    }
}
