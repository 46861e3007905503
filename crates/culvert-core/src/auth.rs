//! Credential helpers shared by the gateway and the sink manager.
//!
//! Passwords are stored as `{salt_hex}${digest_hex}` where the digest is
//! SHA-256 over salt bytes followed by the password. Bearer tokens are
//! HS256 JWTs signed with the process secret and expiring 24 hours after
//! issue.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Token lifetime in seconds.
pub const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Claims carried by every Culvert bearer token.
///
/// `sub` is the user or sink id; `name` is the username or sink email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub iat: u64,
    pub exp: u64,
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt = *uuid::Uuid::new_v4().as_bytes();
    let digest = salted_digest(&salt, password);
    format!("{}${}", hex::encode(salt), hex::encode(digest))
}

/// Constant-shape verification against a stored `{salt}${digest}` hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    hex::encode(salted_digest(&salt, password)) == digest_hex
}

fn salted_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Issue a signed bearer token for the given principal.
pub fn sign_token(secret: &[u8], sub: &str, name: &str) -> Result<String, AuthError> {
    let iat = crate::epoch_secs();
    let claims = Claims {
        sub: sub.to_string(),
        name: name.to_string(),
        iat,
        exp: iat + TOKEN_TTL_SECS,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Verify a bearer token and return its claims.
pub fn verify_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    let validation = Validation::default();
    decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("pw12345");
        assert!(verify_password("pw12345", &hash));
        assert!(!verify_password("pw12346", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        assert_ne!(hash_password("pw12345"), hash_password("pw12345"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("pw", "not-a-hash"));
        assert!(!verify_password("pw", "zz$zz"));
    }

    #[test]
    fn token_round_trips_claims() {
        let token = sign_token(b"secret", "sink-1", "s@x.com").unwrap();
        let claims = verify_token(b"secret", &token).unwrap();
        assert_eq!(claims.sub, "sink-1");
        assert_eq!(claims.name, "s@x.com");
        assert_eq!(claims.exp, claims.iat + TOKEN_TTL_SECS);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = sign_token(b"secret", "sink-1", "s@x.com").unwrap();
        assert!(verify_token(b"other", &token).is_err());
    }
}
