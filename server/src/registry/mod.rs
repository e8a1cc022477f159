//! Device identities and their lifecycle status.

use crate::audit::{AuditEntry, AuditRecorder};
use crate::clock::Clock;
use crate::security::decode_public_key;
use crate::storage::{with_deadline, DeviceRepository};
use common::{
    AuthError, Device, DeviceStatus, EventStatus, EventType, RequestMeta, Result, UserId,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct DeviceRegistry {
    repo: Arc<dyn DeviceRepository>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
    storage_timeout: Duration,
}

impl DeviceRegistry {
    pub fn new(
        repo: Arc<dyn DeviceRepository>,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
        storage_timeout: Duration,
    ) -> Self {
        Self { repo, audit, clock, storage_timeout }
    }

    /// Registers a new device identity for `user_id`.
    ///
    /// Emits a `register` audit event whether or not registration succeeds.
    pub async fn register(
        &self,
        user_id: UserId,
        public_key: &str,
        meta: &RequestMeta,
    ) -> Result<Device> {
        let result = self.create_device(user_id, public_key).await;

        let mut entry = AuditEntry::new(EventType::Register, EventStatus::from_outcome(&result), meta)
            .user(user_id);
        if let Ok(device) = &result {
            entry = entry.device(device.device_id);
        }
        self.audit.record(entry).await;

        result
    }

    async fn create_device(&self, user_id: UserId, public_key: &str) -> Result<Device> {
        let public_key = public_key.trim();
        if public_key.is_empty() {
            return Err(AuthError::Validation("public key is required".to_string()));
        }
        decode_public_key(public_key).map_err(|e| {
            debug!("Rejected public key for user {}: {}", user_id, e);
            AuthError::Validation("public key must be a base64 Ed25519 key".to_string())
        })?;

        let device = Device {
            device_id: Uuid::new_v4(),
            user_id,
            public_key: public_key.to_string(),
            status: DeviceStatus::Active,
            registered_at: self.clock.now(),
            last_seen: None,
        };

        with_deadline(self.storage_timeout, self.repo.insert_device(&device)).await?;
        info!("Registered device {} for user {}", device.device_id, user_id);
        Ok(device)
    }

    pub async fn get_by_id(&self, device_id: Uuid) -> Result<Device> {
        with_deadline(self.storage_timeout, self.repo.get_device(device_id))
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("device {}", device_id)))
    }

    pub async fn touch_last_seen(&self, device_id: Uuid) -> Result<()> {
        let now = self.clock.now();
        let affected = with_deadline(self.storage_timeout, self.repo.touch_last_seen(device_id, now)).await?;
        if !affected {
            return Err(AuthError::NotFound(format!("device {}", device_id)));
        }
        Ok(())
    }

    /// Moves the device to `revoked`. Revoking twice is harmless.
    pub async fn revoke(&self, device_id: Uuid) -> Result<()> {
        let affected = with_deadline(
            self.storage_timeout,
            self.repo.set_status(device_id, DeviceStatus::Revoked),
        )
        .await?;
        if !affected {
            warn!("Revoke requested for unknown device {}", device_id);
            return Err(AuthError::NotFound(format!("device {}", device_id)));
        }
        info!("Revoked device {}", device_id);
        Ok(())
    }
}
