//! Persistence boundary for the authentication core.
//!
//! The core only talks to storage through these traits. Backends are
//! responsible for the atomic compare-and-swap on a challenge's `used` flag,
//! since several server processes may share one store.

mod memory;
mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AuditEvent, AuthError, Challenge, Device, DeviceStatus, Result};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Result of the conditional `used = false -> true` update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This caller flipped the flag.
    Consumed,
    /// Someone else already had.
    AlreadyUsed,
    /// No such challenge row.
    Missing,
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn insert_device(&self, device: &Device) -> Result<()>;

    async fn get_device(&self, device_id: Uuid) -> Result<Option<Device>>;

    /// Returns false when no row was affected.
    async fn touch_last_seen(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Returns false when no row was affected.
    async fn set_status(&self, device_id: Uuid, status: DeviceStatus) -> Result<bool>;
}

#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    async fn insert_challenge(&self, challenge: &Challenge) -> Result<()>;

    async fn get_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>>;

    /// Must be atomic: of any number of concurrent calls for one id, at most
    /// one sees `Consumed`.
    async fn mark_used(&self, challenge_id: Uuid) -> Result<MarkOutcome>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<()>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Bounds a storage call. Running out of time is a storage failure.
pub async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AuthError::Storage(format!(
            "storage deadline of {}ms exceeded",
            timeout.as_millis()
        ))),
    }
}
