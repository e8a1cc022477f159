//! Authentication flows built from the registry, challenge store, verifier,
//! token issuer and audit recorder.
//!
//! Everything on the verification path collapses into one
//! `AuthError::VerificationFailed` before it leaves this module, so callers
//! cannot tell an expired nonce from a bad signature or a revoked device.
//! Storage failures and signing faults are the exception: they are
//! operational problems, not answers about the credential.

use crate::audit::{AuditEntry, AuditRecorder};
use crate::challenge::ChallengeStore;
use crate::clock::Clock;
use crate::registry::DeviceRegistry;
use crate::security::{verify_signature, TokenIssuer};
use crate::storage::{AuditRepository, ChallengeRepository, DeviceRepository};
use common::{
    AuthContext, AuthError, AuthSettings, Challenge, Device, EventStatus, EventType,
    IssuedToken, RequestMeta, Result, UserId,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

pub struct AuthService {
    registry: DeviceRegistry,
    challenges: ChallengeStore,
    tokens: TokenIssuer,
    audit: AuditRecorder,
}

impl AuthService {
    pub fn new(
        registry: DeviceRegistry,
        challenges: ChallengeStore,
        tokens: TokenIssuer,
        audit: AuditRecorder,
    ) -> Self {
        Self { registry, challenges, tokens, audit }
    }

    /// Wires every component to one backing store.
    pub fn with_store<S>(
        store: Arc<S>,
        tokens: TokenIssuer,
        clock: Arc<dyn Clock>,
        settings: &AuthSettings,
    ) -> Result<Self>
    where
        S: DeviceRepository + ChallengeRepository + AuditRepository + 'static,
    {
        let audit = AuditRecorder::new(store.clone(), clock.clone(), settings.storage_timeout);
        let registry = DeviceRegistry::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            settings.storage_timeout,
        );
        let challenges = ChallengeStore::new(
            store,
            clock,
            settings.challenge_ttl,
            settings.storage_timeout,
        )?;
        Ok(Self::new(registry, challenges, tokens, audit))
    }

    pub async fn register_device(
        &self,
        user_id: UserId,
        public_key: &str,
        meta: &RequestMeta,
    ) -> Result<Device> {
        self.registry.register(user_id, public_key, meta).await
    }

    pub async fn get_device(&self, device_id: Uuid) -> Result<Device> {
        self.registry.get_by_id(device_id).await
    }

    /// Issues a fresh challenge for an existing, active device.
    pub async fn request_challenge(&self, device_id: Uuid, meta: &RequestMeta) -> Result<Challenge> {
        let result = self.create_challenge(device_id).await;

        let mut entry = AuditEntry::new(EventType::Challenge, EventStatus::from_outcome(&result), meta)
            .device(device_id);
        if let Ok((device, _)) = &result {
            entry = entry.user(device.user_id);
        }
        self.audit.record(entry).await;

        result.map(|(_, challenge)| challenge)
    }

    async fn create_challenge(&self, device_id: Uuid) -> Result<(Device, Challenge)> {
        let device = self.registry.get_by_id(device_id).await?;
        if !device.is_active() {
            return Err(AuthError::Forbidden("device is not active".to_string()));
        }
        let challenge = self.challenges.create(device_id).await?;
        Ok((device, challenge))
    }

    /// Checks a device's signature over a challenge nonce and, on success,
    /// consumes the challenge and mints an access token.
    pub async fn verify_challenge(
        &self,
        challenge_id: Uuid,
        signature: &str,
        meta: &RequestMeta,
    ) -> Result<IssuedToken> {
        let mut entry = AuditEntry::new(EventType::Verify, EventStatus::Failure, meta);
        let result = self.consume_challenge(challenge_id, signature, &mut entry).await;
        if result.is_ok() {
            entry.event_status = EventStatus::Success;
        }
        self.audit.record(entry).await;
        result
    }

    async fn consume_challenge(
        &self,
        challenge_id: Uuid,
        signature: &str,
        entry: &mut AuditEntry,
    ) -> Result<IssuedToken> {
        let challenge = self
            .challenges
            .get_valid(challenge_id)
            .await
            .map_err(|e| reject(challenge_id, "challenge lookup", e))?;

        entry.device_id = Some(challenge.device_id);
        let device = self
            .registry
            .get_by_id(challenge.device_id)
            .await
            .map_err(|e| reject(challenge_id, "device lookup", e))?;
        entry.user_id = Some(device.user_id);

        if !device.is_active() {
            debug!(
                "Verification of challenge {} refused: device {} is {}",
                challenge_id, device.device_id, device.status
            );
            return Err(AuthError::VerificationFailed);
        }

        // The message is always the stored nonce, never anything the caller sent.
        verify_signature(&device.public_key, &challenge.nonce, signature)
            .map_err(|e| reject(challenge_id, "signature check", e))?;

        // Only the caller that wins this swap gets a token.
        self.challenges
            .mark_used(challenge_id)
            .await
            .map_err(|e| reject(challenge_id, "consume", e))?;

        if let Err(e) = self.registry.touch_last_seen(device.device_id).await {
            warn!("Could not update last_seen for device {}: {}", device.device_id, e);
        }

        let token = self.tokens.issue(device.device_id, device.user_id).map_err(|e| {
            error!(
                "Token signing failed after consuming challenge {}: {}",
                challenge_id, e
            );
            e
        })?;

        info!(
            "Device {} verified with challenge {}",
            device.device_id, challenge_id
        );
        Ok(token)
    }

    /// Administrative revocation. The device can no longer verify or use tokens.
    pub async fn revoke_device(&self, device_id: Uuid, meta: &RequestMeta) -> Result<()> {
        let result = self.registry.revoke(device_id).await;
        self.audit
            .record(
                AuditEntry::new(EventType::Revoke, EventStatus::from_outcome(&result), meta)
                    .device(device_id),
            )
            .await;
        result
    }

    /// Validates a bearer token and requires its device to still be active.
    pub async fn authorize(&self, token: &str) -> Result<AuthContext> {
        let context = self.tokens.validate(token)?;

        let device = match self.registry.get_by_id(context.device_id).await {
            Ok(device) => device,
            Err(e) if e.is_storage() => return Err(e),
            Err(_) => return Err(AuthError::Forbidden("device is not active".to_string())),
        };

        if !device.is_active() || device.user_id != context.user_id {
            debug!("Rejected token for device {} ({})", device.device_id, device.status);
            return Err(AuthError::Forbidden("device is not active".to_string()));
        }
        Ok(context)
    }
}

/// Hides why verification failed, except for storage outages.
fn reject(challenge_id: Uuid, step: &str, err: AuthError) -> AuthError {
    if err.is_storage() {
        warn!("Storage failure during {} for challenge {}: {}", step, challenge_id, err);
        return err;
    }
    debug!("Verification of challenge {} failed at {}: {}", challenge_id, step, err);
    AuthError::VerificationFailed
}
