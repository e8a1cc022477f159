mod token;
mod verifier;

pub use token::{extract_bearer, Claims, TokenIssuer};
pub use verifier::{decode_public_key, verify_signature};
