//! Single-use, time-bounded challenges.
//!
//! A challenge is `Created` until it is either consumed by a successful
//! verification or its validity window passes. Both are terminal.

use crate::clock::Clock;
use crate::storage::{with_deadline, ChallengeRepository, MarkOutcome};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Duration as ChronoDuration;
use common::{AuthError, Challenge, Result};
use log::{debug, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Random bytes per nonce (256 bits).
pub const NONCE_LEN: usize = 32;

pub struct ChallengeStore {
    repo: Arc<dyn ChallengeRepository>,
    clock: Arc<dyn Clock>,
    ttl: ChronoDuration,
    storage_timeout: Duration,
}

impl ChallengeStore {
    pub fn new(
        repo: Arc<dyn ChallengeRepository>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        storage_timeout: Duration,
    ) -> Result<Self> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| AuthError::Config(format!("invalid challenge lifetime: {}", e)))?;
        Ok(Self { repo, clock, ttl, storage_timeout })
    }

    pub async fn create(&self, device_id: Uuid) -> Result<Challenge> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let now = self.clock.now();
        let challenge = Challenge {
            challenge_id: Uuid::new_v4(),
            device_id,
            nonce: STANDARD.encode(nonce),
            expires_at: now + self.ttl,
            used: false,
            created_at: now,
        };

        with_deadline(self.storage_timeout, self.repo.insert_challenge(&challenge)).await?;
        debug!(
            "Issued challenge {} for device {} (expires {})",
            challenge.challenge_id,
            device_id,
            challenge.expires_at.to_rfc3339()
        );
        Ok(challenge)
    }

    /// Returns the challenge only while it is unused and unexpired. Missing,
    /// used and expired challenges all look the same to the caller.
    pub async fn get_valid(&self, challenge_id: Uuid) -> Result<Challenge> {
        let now = self.clock.now();
        with_deadline(self.storage_timeout, self.repo.get_challenge(challenge_id))
            .await?
            .filter(|challenge| challenge.is_valid_at(now))
            .ok_or_else(|| AuthError::NotFound(format!("challenge {}", challenge_id)))
    }

    /// Consumes the challenge. Only one caller can ever succeed for a given id.
    pub async fn mark_used(&self, challenge_id: Uuid) -> Result<()> {
        match with_deadline(self.storage_timeout, self.repo.mark_used(challenge_id)).await? {
            MarkOutcome::Consumed => Ok(()),
            MarkOutcome::AlreadyUsed => {
                warn!("Challenge {} was already consumed", challenge_id);
                Err(AuthError::ChallengeAlreadyUsed)
            }
            MarkOutcome::Missing => Err(AuthError::NotFound(format!("challenge {}", challenge_id))),
        }
    }
}
