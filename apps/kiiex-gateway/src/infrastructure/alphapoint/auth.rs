//! Venue Credentials
//!
//! AlphaPoint API-key authentication. The venue expects
//!
//! ```text
//! Signature = hex(HMAC-SHA256(secret, Nonce + UserId + APIKey))
//! ```
//!
//! sent in an `AuthenticateUser` request. Credentials are loaded from the
//! environment; when a secret is present the signature is derived from it,
//! otherwise a precomputed signature is used as-is.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::messages::AuthenticateUserRequest;
use crate::domain::order::VenueAccount;

type HmacSha256 = Hmac<Sha256>;

/// Credential errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    /// No secret was supplied for signing.
    #[error("secret cannot be empty")]
    EmptySecret,

    /// A required field is missing.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A numeric field did not parse.
    #[error("{name} must be an integer, got {value:?}")]
    InvalidNumber {
        /// Environment variable.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Venue API credentials and account identity.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct VenueCredentials {
    /// API key.
    pub api_key: String,
    /// Hex HMAC signature.
    pub signature: String,
    /// Venue user id.
    pub user_id: i64,
    /// Signing nonce.
    pub nonce: String,
    /// OMS id.
    pub oms_id: i64,
    /// Account id.
    pub account_id: i64,
    /// Venue user name.
    pub username: String,
}

impl std::fmt::Debug for VenueCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueCredentials")
            .field("api_key", &"[REDACTED]")
            .field("signature", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("nonce", &self.nonce)
            .field("oms_id", &self.oms_id)
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .finish()
    }
}

impl VenueCredentials {
    /// Load credentials from `KIIEX_*` environment variables.
    ///
    /// Returns `Ok(None)` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric id does not parse or signing fails.
    pub fn from_env() -> Result<Option<Self>, CredentialsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load credentials through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).unwrap_or_default();

        let api_key = var("KIIEX_API_KEY");
        if api_key.is_empty() {
            return Ok(None);
        }

        let mut credentials = Self {
            api_key,
            signature: var("KIIEX_API_SIGNATURE"),
            user_id: parse_id("KIIEX_API_USER_ID", lookup("KIIEX_API_USER_ID"))?,
            nonce: var("KIIEX_API_NONCE"),
            oms_id: parse_id("KIIEX_OMS_ID", lookup("KIIEX_OMS_ID"))?,
            account_id: parse_id("KIIEX_ACCOUNT_ID", lookup("KIIEX_ACCOUNT_ID"))?,
            username: var("KIIEX_USERNAME"),
        };

        let secret = var("KIIEX_API_SECRET");
        if !secret.is_empty() {
            credentials.generate_signature(&secret)?;
        }

        Ok(Some(credentials))
    }

    /// Derive and store the signature from the API secret.
    ///
    /// # Errors
    ///
    /// Returns `EmptySecret` if `secret` is empty.
    pub fn generate_signature(&mut self, secret: &str) -> Result<(), CredentialsError> {
        if secret.is_empty() {
            return Err(CredentialsError::EmptySecret);
        }

        let message = format!("{}{}{}", self.nonce, self.user_id, self.api_key);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| CredentialsError::EmptySecret)?;
        mac.update(message.as_bytes());
        self.signature = hex::encode(mac.finalize().into_bytes());
        Ok(())
    }

    /// Check that every field the venue needs is present.
    ///
    /// # Errors
    ///
    /// Names the first missing field.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.api_key.is_empty() {
            return Err(CredentialsError::Missing("APIKey"));
        }
        if self.user_id == 0 {
            return Err(CredentialsError::Missing("UserId"));
        }
        if self.nonce.is_empty() {
            return Err(CredentialsError::Missing("Nonce"));
        }
        if self.oms_id == 0 {
            return Err(CredentialsError::Missing("OMSId"));
        }
        if self.account_id == 0 {
            return Err(CredentialsError::Missing("AccountId"));
        }
        Ok(())
    }

    /// Venue account these credentials trade on.
    #[must_use]
    pub const fn account(&self) -> VenueAccount {
        VenueAccount {
            oms_id: self.oms_id,
            account_id: self.account_id,
        }
    }

    /// Build the `AuthenticateUser` payload.
    #[must_use]
    pub fn to_auth_request(&self) -> AuthenticateUserRequest {
        AuthenticateUserRequest {
            api_key: self.api_key.clone(),
            signature: self.signature.clone(),
            user_id: self.user_id,
            nonce: self.nonce.clone(),
        }
    }
}

fn parse_id(name: &'static str, value: Option<String>) -> Result<i64, CredentialsError> {
    match value {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| CredentialsError::InvalidNumber { name, value }),
        _ => Ok(0),
    }
}
