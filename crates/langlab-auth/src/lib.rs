//! # langlab-auth
//!
//! Turns the token a client presents in its `auth` message into a verified
//! [`Identity`](langlab_core::Identity).
//!
//! Credential checking and token issuance live in the login layer; this
//! crate only verifies what that layer signed. [`TokenVerifier`] is the seam
//! the channel sessions depend on, [`JwtVerifier`] the shipped implementation.

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;

pub use errors::AuthError;
pub use jwt::{Claims, JwtVerifier};

use langlab_core::Identity;

/// Verifies a channel token and yields the identity it carries.
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`. The returned identity is trusted verbatim.
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}
