use super::{AuditRepository, ChallengeRepository, DeviceRepository, HealthCheck, MarkOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AuditEvent, AuthError, Challenge, Device, DeviceStatus, Result};
use log::{debug, info};
use redis::aio::ConnectionManager;
use redis::{Client as RedisClient, Script};
use std::collections::HashMap;
use uuid::Uuid;

/// Challenge rows outlive their validity window by this long before Redis drops them.
const CHALLENGE_RETENTION_SECS: i64 = 3600;

const AUDIT_LOG_KEY: &str = "audit_log";

// -1 missing, 0 already used, 1 consumed by this call.
const MARK_USED_LUA: &str = r#"
local used = redis.call('HGET', KEYS[1], 'used')
if not used then
    return -1
end
if used == '1' then
    return 0
end
redis.call('HSET', KEYS[1], 'used', '1')
return 1
"#;

// Updates one field of an existing hash; never creates the hash.
const UPDATE_FIELD_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return 1
"#;

fn device_key(device_id: Uuid) -> String {
    format!("device:{}", device_id)
}

fn challenge_key(challenge_id: Uuid) -> String {
    format!("challenge:{}", challenge_id)
}

/// Shared store for deployments running several server processes.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    mark_used_script: Script,
    update_field_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = RedisClient::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            mark_used_script: Script::new(MARK_USED_LUA),
            update_field_script: Script::new(UPDATE_FIELD_LUA),
        })
    }

    async fn update_field(&self, key: String, field: &str, value: String) -> Result<bool> {
        let mut conn = self.conn.clone();
        let affected: i64 = self
            .update_field_script
            .key(key)
            .arg(field)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(affected == 1)
    }

    async fn get_hash(&self, key: String) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(fields)
    }
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| AuthError::Serialization(format!("stored record is missing '{}'", name)))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AuthError::Serialization(e.to_string()))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AuthError::Serialization(e.to_string()))
}

fn device_from_fields(fields: &HashMap<String, String>) -> Result<Device> {
    let status = field(fields, "status")?;
    Ok(Device {
        device_id: parse_uuid(field(fields, "device_id")?)?,
        user_id: field(fields, "user_id")?
            .parse()
            .map_err(|_| AuthError::Serialization("invalid user_id".to_string()))?,
        public_key: field(fields, "public_key")?.to_string(),
        status: DeviceStatus::parse(status)
            .ok_or_else(|| AuthError::Serialization(format!("invalid status '{}'", status)))?,
        registered_at: parse_time(field(fields, "registered_at")?)?,
        last_seen: fields.get("last_seen").map(|v| parse_time(v)).transpose()?,
    })
}

fn challenge_from_fields(fields: &HashMap<String, String>) -> Result<Challenge> {
    Ok(Challenge {
        challenge_id: parse_uuid(field(fields, "challenge_id")?)?,
        device_id: parse_uuid(field(fields, "device_id")?)?,
        nonce: field(fields, "nonce")?.to_string(),
        expires_at: parse_time(field(fields, "expires_at")?)?,
        used: field(fields, "used")? == "1",
        created_at: parse_time(field(fields, "created_at")?)?,
    })
}

#[async_trait]
impl DeviceRepository for RedisStore {
    async fn insert_device(&self, device: &Device) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(device_key(device.device_id))
            .arg("device_id").arg(device.device_id.to_string())
            .arg("user_id").arg(device.user_id)
            .arg("public_key").arg(&device.public_key)
            .arg("status").arg(device.status.as_str())
            .arg("registered_at").arg(device.registered_at.to_rfc3339());
        if let Some(last_seen) = device.last_seen {
            cmd.arg("last_seen").arg(last_seen.to_rfc3339());
        }
        cmd.query_async::<_, ()>(&mut conn).await?;

        debug!("Stored device {} in Redis", device.device_id);
        Ok(())
    }

    async fn get_device(&self, device_id: Uuid) -> Result<Option<Device>> {
        let fields = self.get_hash(device_key(device_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        device_from_fields(&fields).map(Some)
    }

    async fn touch_last_seen(&self, device_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.update_field(device_key(device_id), "last_seen", at.to_rfc3339())
            .await
    }

    async fn set_status(&self, device_id: Uuid, status: DeviceStatus) -> Result<bool> {
        self.update_field(device_key(device_id), "status", status.as_str().to_string())
            .await
    }
}

#[async_trait]
impl ChallengeRepository for RedisStore {
    async fn insert_challenge(&self, challenge: &Challenge) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = challenge_key(challenge.challenge_id);

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("challenge_id").arg(challenge.challenge_id.to_string())
            .arg("device_id").arg(challenge.device_id.to_string())
            .arg("nonce").arg(&challenge.nonce)
            .arg("expires_at").arg(challenge.expires_at.to_rfc3339())
            .arg("used").arg(if challenge.used { "1" } else { "0" })
            .arg("created_at").arg(challenge.created_at.to_rfc3339())
            .ignore()
            .cmd("EXPIREAT")
            .arg(&key)
            .arg(challenge.expires_at.timestamp() + CHALLENGE_RETENTION_SECS)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn get_challenge(&self, challenge_id: Uuid) -> Result<Option<Challenge>> {
        let fields = self.get_hash(challenge_key(challenge_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        challenge_from_fields(&fields).map(Some)
    }

    async fn mark_used(&self, challenge_id: Uuid) -> Result<MarkOutcome> {
        let mut conn = self.conn.clone();
        let outcome: i64 = self
            .mark_used_script
            .key(challenge_key(challenge_id))
            .invoke_async(&mut conn)
            .await?;

        Ok(match outcome {
            1 => MarkOutcome::Consumed,
            0 => MarkOutcome::AlreadyUsed,
            _ => MarkOutcome::Missing,
        })
    }
}

#[async_trait]
impl AuditRepository for RedisStore {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut conn = self.conn.clone();
        let data = serde_json::to_string(event)?;

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("RPUSH").arg(AUDIT_LOG_KEY).arg(&data).ignore();
        if let Some(device_id) = event.device_id {
            pipe.cmd("RPUSH")
                .arg(format!("{}:device:{}", AUDIT_LOG_KEY, device_id))
                .arg(&data)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(AuthError::Storage(format!("unexpected Redis response: {}", response)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    #[test]
    fn test_device_round_trips_through_hash_fields() {
        let now = Utc::now();
        let mut fields = HashMap::new();
        let id = Uuid::new_v4();
        fields.insert("device_id".to_string(), id.to_string());
        fields.insert("user_id".to_string(), "42".to_string());
        fields.insert("public_key".to_string(), "a2V5".to_string());
        fields.insert("status".to_string(), "revoked".to_string());
        fields.insert("registered_at".to_string(), now.to_rfc3339());

        let device = device_from_fields(&fields).unwrap();
        assert_eq!(device.device_id, id);
        assert_eq!(device.user_id, 42);
        assert_eq!(device.status, DeviceStatus::Revoked);
        assert!(device.last_seen.is_none());

        fields.insert("status".to_string(), "unknown".to_string());
        assert!(matches!(device_from_fields(&fields), Err(AuthError::Serialization(_))));
    }

    #[test]
    fn test_challenge_used_flag_parsing() {
        let now = Utc::now();
        let mut fields = HashMap::new();
        fields.insert("challenge_id".to_string(), Uuid::new_v4().to_string());
        fields.insert("device_id".to_string(), Uuid::new_v4().to_string());
        fields.insert("nonce".to_string(), "bm9uY2U=".to_string());
        fields.insert("expires_at".to_string(), (now + Duration::minutes(2)).to_rfc3339());
        fields.insert("used".to_string(), "0".to_string());
        fields.insert("created_at".to_string(), now.to_rfc3339());

        assert!(!challenge_from_fields(&fields).unwrap().used);
        fields.insert("used".to_string(), "1".to_string());
        assert!(challenge_from_fields(&fields).unwrap().used);
        fields.remove("nonce");
        assert!(challenge_from_fields(&fields).is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_mark_used_once() -> Result<()> {
        let store = RedisStore::connect(REDIS_URL).await?;
        let now = Utc::now();
        let challenge = Challenge {
            challenge_id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            nonce: "bm9uY2U=".to_string(),
            expires_at: now + Duration::minutes(2),
            used: false,
            created_at: now,
        };

        store.insert_challenge(&challenge).await?;
        assert_eq!(store.mark_used(challenge.challenge_id).await?, MarkOutcome::Consumed);
        assert_eq!(store.mark_used(challenge.challenge_id).await?, MarkOutcome::AlreadyUsed);
        assert_eq!(store.mark_used(Uuid::new_v4()).await?, MarkOutcome::Missing);
        assert!(store.get_challenge(challenge.challenge_id).await?.unwrap().used);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_device_updates() -> Result<()> {
        let store = RedisStore::connect(REDIS_URL).await?;
        let device = Device {
            device_id: Uuid::new_v4(),
            user_id: 7,
            public_key: "a2V5".to_string(),
            status: DeviceStatus::Active,
            registered_at: Utc::now(),
            last_seen: None,
        };

        store.insert_device(&device).await?;
        assert!(store.touch_last_seen(device.device_id, Utc::now()).await?);
        assert!(store.set_status(device.device_id, DeviceStatus::Revoked).await?);
        assert!(!store.set_status(Uuid::new_v4(), DeviceStatus::Revoked).await?);

        let stored = store.get_device(device.device_id).await?.unwrap();
        assert_eq!(stored.status, DeviceStatus::Revoked);
        assert!(stored.last_seen.is_some());
        assert!(store.get_device(Uuid::new_v4()).await?.is_none());
        Ok(())
    }
}
