use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Owning principal of a device.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Revoked,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(DeviceStatus::Active),
            "revoked" => Some(DeviceStatus::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered public-key identity bound to one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub device_id: Uuid,
    pub user_id: UserId,
    /// Base64 Ed25519 public key, never changes after registration.
    pub public_key: String,
    pub status: DeviceStatus,
    pub registered_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }
}

/// Single-use proof-of-possession nonce scoped to one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Challenge {
    pub challenge_id: Uuid,
    pub device_id: Uuid,
    /// Base64 of at least 32 random bytes.
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// Valid iff unused and not yet expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Register,
    Challenge,
    Verify,
    Revoke,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Register => "register",
            EventType::Challenge => "challenge",
            EventType::Verify => "verify",
            EventType::Revoke => "revoke",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Failure,
}

impl EventStatus {
    pub fn from_outcome<T, E>(outcome: &std::result::Result<T, E>) -> Self {
        if outcome.is_ok() {
            EventStatus::Success
        } else {
            EventStatus::Failure
        }
    }
}

/// Caller details the transport layer hands to the core for auditing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestMeta {
    pub ip_address: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Immutable, append-only record of a security-relevant action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub audit_id: Uuid,
    pub user_id: Option<UserId>,
    pub device_id: Option<Uuid>,
    pub event_type: EventType,
    pub event_status: EventStatus,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Authenticated caller identity, produced once at the transport boundary
/// and passed explicitly to whatever needs it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthContext {
    pub device_id: Uuid,
    pub user_id: UserId,
}

/// A freshly minted bearer token and the claims it carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub device_id: Uuid,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(expires_in: Duration, used: bool) -> Challenge {
        let now = Utc::now();
        Challenge {
            challenge_id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            nonce: "bm9uY2U=".to_string(),
            expires_at: now + expires_in,
            used,
            created_at: now,
        }
    }

    #[test]
    fn test_challenge_validity() {
        let now = Utc::now();
        assert!(challenge(Duration::minutes(2), false).is_valid_at(now));
        assert!(!challenge(Duration::minutes(2), true).is_valid_at(now));
        assert!(!challenge(Duration::minutes(-1), false).is_valid_at(now));
    }

    #[test]
    fn test_challenge_expiry_boundary_is_exclusive() {
        let c = challenge(Duration::minutes(2), false);
        assert!(!c.is_valid_at(c.expires_at));
        assert!(c.is_valid_at(c.expires_at - Duration::milliseconds(1)));
    }

    #[test]
    fn test_device_status_strings() {
        assert_eq!(DeviceStatus::parse("active"), Some(DeviceStatus::Active));
        assert_eq!(DeviceStatus::parse("revoked"), Some(DeviceStatus::Revoked));
        assert_eq!(DeviceStatus::parse("Active"), None);
        assert_eq!(
            serde_json::to_string(&DeviceStatus::Revoked).unwrap(),
            "\"revoked\""
        );
    }

    #[test]
    fn test_event_status_from_outcome() {
        let ok: std::result::Result<(), ()> = Ok(());
        let err: std::result::Result<(), ()> = Err(());
        assert_eq!(EventStatus::from_outcome(&ok), EventStatus::Success);
        assert_eq!(EventStatus::from_outcome(&err), EventStatus::Failure);
    }
}
