use super::{AuditRepository, ChallengeRepository, DeviceRepository, HealthCheck, MarkOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AuditEvent, AuthError, Challenge, Device, DeviceStatus, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// In-process store. Suitable for a single server process and for tests.
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<Uuid, Device>>,
    challenges: RwLock<HashMap<Uuid, Challenge>>,
    audit_log: RwLock<Vec<AuditEvent>>,
    fail_audit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent audit append fail, to simulate an audit outage.
    pub fn set_audit_failure(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit_log.read().clone()
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().len()
    }
}

#[async_trait]
impl DeviceRepository for MemoryStore {
    async fn insert_device(&self, device: &Device) -> Result<()> {
        let mut devices = self.devices.write();
        if devices.contains_key(&device.device_id) {
            return Err(AuthError::Storage(format!(
                "device {} already exists",
                device.device_id
            )));
        }
        devices.insert(device.device_id, device.clone());
        Ok(())
    }

    async fn get_device(&self, device_id: Uuid) -> Result<Option<Device>> {
        Ok(self.devices.read().get(&device_id).cloned())
    }

    async fn touch_last_seen(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        match self.devices.write().get_mut(&device_id) {
            Some(device) => {
                device.last_seen = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(&self, device_id: Uuid, status: DeviceStatus) -> Result<bool> {
        match self.devices.write().get_mut(&device_id) {
            Some(device) => {
                device.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ChallengeRepository for MemoryStore {
    async fn insert_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.challenges
            .write()
            .insert(challenge.challenge_id, challenge.clone());
        Ok(())
    }

    async fn get_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>> {
        Ok(self.challenges.read().get(&challenge_id).cloned())
    }

    async fn mark_used(&self, challenge_id: Uuid) -> Result<MarkOutcome> {
        // Check and flip under one write guard.
        let mut challenges = self.challenges.write();
        Ok(match challenges.get_mut(&challenge_id) {
            None => MarkOutcome::Missing,
            Some(challenge) if challenge.used => MarkOutcome::AlreadyUsed,
            Some(challenge) => {
                challenge.used = true;
                MarkOutcome::Consumed
            }
        })
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("audit log unavailable".to_string()));
        }
        self.audit_log.write().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
