//! HS256 JWT verification.
//!
//! Tokens are issued by the login endpoint with claims
//! `{ "id": "student1", "username": "student", "role": "student", "exp": … }`.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use langlab_core::{Identity, Role, UserId};
use serde::{Deserialize, Serialize};

use crate::TokenVerifier;
use crate::errors::AuthError;

/// Claims carried by a login token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub id: String,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Account role (`teacher`, `student`, `admin`).
    pub role: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

impl Claims {
    /// Claims expiring `ttl` from now.
    pub fn new(id: &str, username: &str, role: Role, ttl: chrono::Duration) -> Self {
        Self {
            id: id.to_owned(),
            username: username.to_owned(),
            role: role.as_str().to_owned(),
            exp: (chrono::Utc::now() + ttl).timestamp(),
        }
    }
}

/// Verifies HS256 tokens signed with a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier for `secret`.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                AuthError::Expired
            } else {
                AuthError::InvalidToken(e)
            }
        })?;
        let claims = data.claims;
        if claims.id.is_empty() {
            return Err(AuthError::MissingUserId);
        }
        let role: Role = claims
            .role
            .parse()
            .map_err(|_| AuthError::UnknownRole(claims.role.clone()))?;
        Ok(Identity::new(UserId::new(claims.id), role))
    }
}
