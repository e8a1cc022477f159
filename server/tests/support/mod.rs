#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use common::{AuthSettings, Challenge};
use device_auth::clock::{Clock, ManualClock};
use device_auth::security::TokenIssuer;
use device_auth::storage::MemoryStore;
use device_auth::AuthService;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use std::sync::Arc;

pub const SECRET: &str = "integration-secret-with-more-than-32-chars";

/// A device holding its own private key.
pub struct TestDevice {
    key: SigningKey,
}

impl TestDevice {
    pub fn new() -> Self {
        Self { key: SigningKey::generate(&mut OsRng) }
    }

    pub fn public_key(&self) -> String {
        STANDARD.encode(self.key.verifying_key().to_bytes())
    }

    /// Signs the raw nonce bytes, the way a device answers a challenge.
    pub fn answer(&self, challenge: &Challenge) -> String {
        let nonce = STANDARD.decode(&challenge.nonce).expect("nonce is base64");
        STANDARD.encode(self.key.sign(&nonce).to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> String {
        STANDARD.encode(self.key.sign(message).to_bytes())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub settings: AuthSettings,
    pub service: Arc<AuthService>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let settings = AuthSettings::default();
        let service = Arc::new(build_service(store.clone(), clock.clone(), &settings));
        Self { store, clock, settings, service }
    }
}

pub fn build_service(store: Arc<MemoryStore>, clock: Arc<ManualClock>, settings: &AuthSettings) -> AuthService {
    let clock: Arc<dyn Clock> = clock;
    let tokens = TokenIssuer::new(SECRET, settings.token_ttl, clock.clone()).expect("valid secret");
    AuthService::with_store(store, tokens, clock, settings).expect("valid settings")
}
