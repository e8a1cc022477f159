use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use crate::error::AuthError;
use crate::{AuthSettings, Result};

/// Minimum length of the token signing secret, in bytes.
pub const MIN_TOKEN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Redis,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AuthError::Config(format!("unknown storage backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_address: String,
    pub storage_backend: StorageBackend,
    pub redis_url: String,
    pub token_secret: String,
    pub challenge_ttl_secs: u64,
    pub token_ttl_secs: u64,
    pub storage_timeout_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_secret = lookup("TOKEN_SECRET")
            .ok_or_else(|| AuthError::Config("TOKEN_SECRET is required".to_string()))?;
        if token_secret.len() < MIN_TOKEN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "TOKEN_SECRET must be at least {} characters",
                MIN_TOKEN_SECRET_LEN
            )));
        }

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS")
                .unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            storage_backend: lookup("STORAGE_BACKEND")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(StorageBackend::Redis),
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            token_secret,
            challenge_ttl_secs: parse_number(&lookup, "CHALLENGE_TTL_SECS", 120)?,
            token_ttl_secs: parse_number(&lookup, "TOKEN_TTL_SECS", 300)?,
            storage_timeout_ms: parse_number(&lookup, "STORAGE_TIMEOUT_MS", 5000)?,
        })
    }

    pub fn settings(&self) -> AuthSettings {
        AuthSettings {
            challenge_ttl: Duration::from_secs(self.challenge_ttl_secs),
            token_ttl: Duration::from_secs(self.token_ttl_secs),
            storage_timeout: Duration::from_millis(self.storage_timeout_ms),
        }
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AuthError::Config(format!("{} must be a positive integer", key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("TOKEN_SECRET", SECRET)])).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.storage_backend, StorageBackend::Redis);
        let settings = config.settings();
        assert_eq!(settings.challenge_ttl, Duration::from_secs(120));
        assert_eq!(settings.token_ttl, Duration::from_secs(300));
        assert_eq!(settings.storage_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_secret_required_and_long_enough() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[])),
            Err(AuthError::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("TOKEN_SECRET", "short")])),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TOKEN_SECRET", SECRET),
            ("STORAGE_BACKEND", "memory"),
            ("CHALLENGE_TTL_SECS", "30"),
            ("STORAGE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.settings().challenge_ttl, Duration::from_secs(30));
        assert_eq!(config.settings().storage_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Config::from_lookup(lookup_from(&[
            ("TOKEN_SECRET", SECRET),
            ("TOKEN_TTL_SECS", "five"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup_from(&[
            ("TOKEN_SECRET", SECRET),
            ("STORAGE_BACKEND", "postgres"),
        ]))
        .is_err());
    }
}
