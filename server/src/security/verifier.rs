use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use common::{AuthError, EncodedField, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};

fn decode(value: &str, field: EncodedField) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|_| AuthError::Encoding { field })
}

fn key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey> {
    let bytes: &[u8; PUBLIC_KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| AuthError::InvalidKeySize {
            expected: PUBLIC_KEY_LENGTH,
            actual: bytes.len(),
        })?;
    VerifyingKey::from_bytes(bytes).map_err(|_| AuthError::SignatureInvalid)
}

/// Decodes a base64 Ed25519 public key and checks it is a usable curve point.
pub fn decode_public_key(public_key_b64: &str) -> Result<VerifyingKey> {
    let bytes = decode(public_key_b64, EncodedField::PublicKey)?;
    key_from_bytes(&bytes)
}

/// Checks `signature` over the decoded `message` with `public_key`.
///
/// All three inputs are standard base64. Stateless; safe to call from any
/// number of tasks at once.
pub fn verify_signature(
    public_key_b64: &str,
    message_b64: &str,
    signature_b64: &str,
) -> Result<()> {
    let public_key = decode(public_key_b64, EncodedField::PublicKey)?;
    let message = decode(message_b64, EncodedField::Message)?;
    let signature = decode(signature_b64, EncodedField::Signature)?;

    let public_key = key_from_bytes(&public_key)?;
    let signature = Signature::from_slice(&signature).map_err(|_| AuthError::SignatureInvalid)?;

    public_key
        .verify(&message, &signature)
        .map_err(|_| AuthError::SignatureInvalid)
}
