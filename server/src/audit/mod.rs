//! Best-effort audit trail.
//!
//! Every security-relevant action gets one append attempt, made inline before
//! the request completes. A failed append is logged and dropped; it never
//! changes the outcome of the action being audited.

use crate::clock::Clock;
use crate::storage::{with_deadline, AuditRepository};
use common::{AuditEvent, EventStatus, EventType, RequestMeta, UserId};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What happened, to whom, and from where.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub event_type: EventType,
    pub event_status: EventStatus,
    pub user_id: Option<UserId>,
    pub device_id: Option<Uuid>,
    pub meta: RequestMeta,
}

impl AuditEntry {
    pub fn new(event_type: EventType, event_status: EventStatus, meta: &RequestMeta) -> Self {
        Self {
            event_type,
            event_status,
            user_id: None,
            device_id: None,
            meta: meta.clone(),
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn device(mut self, device_id: Uuid) -> Self {
        self.device_id = Some(device_id);
        self
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    repo: Arc<dyn AuditRepository>,
    clock: Arc<dyn Clock>,
    storage_timeout: Duration,
}

impl AuditRecorder {
    pub fn new(repo: Arc<dyn AuditRepository>, clock: Arc<dyn Clock>, storage_timeout: Duration) -> Self {
        Self { repo, clock, storage_timeout }
    }

    pub async fn record(&self, entry: AuditEntry) {
        let event = AuditEvent {
            audit_id: Uuid::new_v4(),
            user_id: entry.user_id,
            device_id: entry.device_id,
            event_type: entry.event_type,
            event_status: entry.event_status,
            ip_address: entry.meta.ip_address,
            user_agent: entry.meta.user_agent,
            created_at: self.clock.now(),
        };

        match with_deadline(self.storage_timeout, self.repo.append(&event)).await {
            Ok(()) => debug!(
                "Audit {} {:?} recorded ({})",
                event.event_type.as_str(),
                event.event_status,
                event.audit_id
            ),
            Err(e) => warn!(
                "Dropping audit event {} {:?} for device {:?}: {}",
                event.event_type.as_str(),
                event.event_status,
                event.device_id,
                e
            ),
        }
    }
}
