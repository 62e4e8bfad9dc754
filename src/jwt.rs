//! Access token generation and validation.
//!
//! Access tokens are short-lived, stateless HS256 JWTs. Verification is pure
//! computation over the signed blob; no database round trip is involved, so
//! it is safe on the hot per-request path.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimum length of the HMAC signing secret, in bytes.
/// A shorter secret is a configuration defect, not a runtime condition.
pub const MIN_JWT_SECRET_LENGTH: usize = 64;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;

/// JWT claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (username)
    pub sub: String,
    /// Database user ID
    pub uid: i64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of issuing an access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded JWT string
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Configuration for access token operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and access TTL.
    /// Fails with `WeakSecret` if the secret is shorter than 64 bytes.
    pub fn new(secret: &[u8], access_ttl_secs: u64) -> Result<Self, JwtError> {
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(JwtError::WeakSecret);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
        })
    }

    /// Issue an access token for a user.
    pub fn issue(&self, username: &str, user_id: i64) -> Result<IssuedToken, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let claims = AccessClaims {
            sub: username.to_string(),
            uid: user_id,
            iat: now,
            exp: now + self.access_ttl_secs,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_in: self.access_ttl_secs,
        })
    }

    /// Validate and decode an access token.
    /// Distinguishes an expired token from a tampered or malformed one.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(
                |e| match e.kind() {
                    ErrorKind::ExpiredSignature => JwtError::Expired,
                    _ => JwtError::InvalidToken(e),
                },
            )?;

        Ok(token_data.claims)
    }
}

/// Errors that can occur during access token operations.
#[derive(Debug)]
pub enum JwtError {
    /// Signing secret shorter than the minimum length
    WeakSecret,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Signature mismatch or malformed token
    InvalidToken(jsonwebtoken::errors::Error),
    /// Token past its expiry
    Expired,
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::WeakSecret => write!(
                f,
                "JWT secret must be at least {} characters",
                MIN_JWT_SECRET_LENGTH
            ),
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::InvalidToken(e) => write!(f, "Invalid token: {}", e),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &[u8] = b"test-secret-key-for-testing-that-is-at-least-64-characters-long!!";

    #[test]
    fn test_issue_and_verify() {
        let config = JwtConfig::new(TEST_SECRET, DEFAULT_ACCESS_TTL_SECS).unwrap();

        let issued = config.issue("alice", 42).unwrap();
        assert_eq!(issued.expires_in, DEFAULT_ACCESS_TTL_SECS);

        let claims = config.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uid, 42);
        assert_eq!(claims.exp, claims.iat + DEFAULT_ACCESS_TTL_SECS);
    }

    #[test]
    fn test_weak_secret_rejected() {
        let result = JwtConfig::new(b"too-short", DEFAULT_ACCESS_TTL_SECS);
        assert!(matches!(result, Err(JwtError::WeakSecret)));

        // 63 bytes is still too short; 64 is accepted.
        let result = JwtConfig::new(&[b'x'; 63], DEFAULT_ACCESS_TTL_SECS);
        assert!(matches!(result, Err(JwtError::WeakSecret)));
        assert!(JwtConfig::new(&[b'x'; 64], DEFAULT_ACCESS_TTL_SECS).is_ok());
    }

    #[test]
    fn test_invalid_token() {
        let config = JwtConfig::new(TEST_SECRET, DEFAULT_ACCESS_TTL_SECS).unwrap();

        let result = config.verify("not-a-token");
        assert!(matches!(result, Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig::new(&[b'a'; 64], DEFAULT_ACCESS_TTL_SECS).unwrap();
        let config2 = JwtConfig::new(&[b'b'; 64], DEFAULT_ACCESS_TTL_SECS).unwrap();

        let issued = config1.issue("alice", 1).unwrap();

        let result = config2.verify(&issued.token);
        assert!(matches!(result, Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        // Encode claims with exp in the past using the same secret.
        let claims = AccessClaims {
            sub: "alice".to_string(),
            uid: 1,
            iat: now - 100,
            exp: now - 50,
        };
        let encoding_key = EncodingKey::from_secret(TEST_SECRET);
        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(TEST_SECRET, DEFAULT_ACCESS_TTL_SECS).unwrap();
        let result = config.verify(&token);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_tampered_token_is_invalid_not_expired() {
        let config = JwtConfig::new(TEST_SECRET, DEFAULT_ACCESS_TTL_SECS).unwrap();
        let issued = config.issue("alice", 1).unwrap();

        let mut tampered = issued.token.clone();
        tampered.push('x');

        assert!(matches!(
            config.verify(&tampered),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_custom_ttl() {
        let config = JwtConfig::new(TEST_SECRET, 30).unwrap();
        let issued = config.issue("bob", 7).unwrap();
        assert_eq!(issued.expires_in, 30);

        let claims = config.verify(&issued.token).unwrap();
        assert_eq!(claims.exp - claims.iat, 30);
    }
}
