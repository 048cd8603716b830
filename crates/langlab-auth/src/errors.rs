//! Token verification errors.

use thiserror::Error;

/// Why a token was rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signature, format or claim validation failed.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    /// The token's `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// The token names a role this service does not know.
    #[error("unknown role: {0}")]
    UnknownRole(String),
    /// The token carries an empty user id.
    #[error("token has no user id")]
    MissingUserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(AuthError::Expired.to_string(), "token expired");
        assert_eq!(
            AuthError::UnknownRole("guest".into()).to_string(),
            "unknown role: guest"
        );
        assert_eq!(AuthError::MissingUserId.to_string(), "token has no user id");
    }
}
