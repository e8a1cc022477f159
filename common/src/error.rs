use actix_web::{ResponseError, HttpResponse};
use actix_web::http::StatusCode;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use redis::RedisError;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Which base64 input of a signature check failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedField {
    PublicKey,
    Message,
    Signature,
}

impl fmt::Display for EncodedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodedField::PublicKey => write!(f, "public key"),
            EncodedField::Message => write!(f, "message"),
            EncodedField::Signature => write!(f, "signature"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid {field} encoding")]
    Encoding { field: EncodedField },
    #[error("Invalid public key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },
    #[error("Signature verification failed")]
    SignatureInvalid,
    #[error("Challenge already used")]
    ChallengeAlreadyUsed,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Signing error: {0}")]
    Signing(String),
    #[error("verification failed")]
    VerificationFailed,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// True for failures of the storage layer itself (unavailable, deadline exceeded).
    pub fn is_storage(&self) -> bool {
        matches!(self, AuthError::Storage(_))
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Serialization(err.to_string())
    }
}

impl From<RedisError> for AuthError {
    fn from(err: RedisError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) |
            Self::Encoding { .. } |
            Self::InvalidKeySize { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::VerificationFailed |
            Self::Unauthorized(_) |
            Self::SignatureInvalid |
            Self::ChallengeAlreadyUsed => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Storage(_) |
            Self::Signing(_) |
            Self::Config(_) |
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal details stay in the logs.
        let message = match self {
            Self::Storage(_) | Self::Signing(_) | Self::Config(_) | Self::Serialization(_) => {
                "internal error".to_string()
            }
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failed_is_opaque() {
        assert_eq!(AuthError::VerificationFailed.to_string(), "verification failed");
        assert_eq!(AuthError::VerificationFailed.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_encoding_error_names_field() {
        let err = AuthError::Encoding { field: EncodedField::Signature };
        assert_eq!(err.to_string(), "Invalid signature encoding");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::NotFound("device".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AuthError::Forbidden("revoked".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::Storage("down".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(AuthError::Storage("down".into()).is_storage());
        assert!(!AuthError::ChallengeAlreadyUsed.is_storage());
    }
}
