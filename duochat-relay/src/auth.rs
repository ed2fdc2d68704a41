//! Account registry and token-based connection auth.
//!
//! Passwords are hashed with Argon2id and never stored in plaintext.
//! Login produces a signed HS256 token naming the identity; WebSocket
//! attach presents that token and the relay trusts nothing else about
//! who the connection claims to be.

use std::collections::HashMap;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Errors from account or token operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Username or password was empty.
    #[error("missing username or password")]
    MissingCredentials,

    /// The username is already taken.
    #[error("user already exists")]
    UserExists,

    /// Login failed; deliberately does not say whether the user exists.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The presented token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The presented token is malformed or has a bad signature.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Hashing or signing failed.
    #[error("credential processing failed: {0}")]
    Internal(String),
}

/// In-memory account registry mapping usernames to Argon2id hashes.
///
/// Uses a synchronous lock: hashing happens outside the critical section
/// and the map operations themselves are trivial.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: parking_lot::RwLock<HashMap<String, String>>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] for empty fields,
    /// [`AuthError::UserExists`] if the username is taken, or
    /// [`AuthError::Internal`] if hashing fails.
    pub fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if self.users.read().contains_key(username) {
            return Err(AuthError::UserExists);
        }

        let hash = hash_password(password)?;

        // Re-check under the write lock: a concurrent register may have won.
        let mut users = self.users.write();
        if users.contains_key(username) {
            return Err(AuthError::UserExists);
        }
        users.insert(username.to_string(), hash);
        Ok(())
    }

    /// Verifies a password against the stored hash.
    ///
    /// Returns `Ok(false)` for an unknown user or a wrong password so that
    /// callers cannot distinguish the two.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the stored hash is unparseable.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let Some(hash) = self.users.read().get(username).cloned() else {
            return Ok(false);
        };
        verify_password(password, &hash)
    }

    /// Returns whether an account exists for the username.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.users.read().contains_key(username)
    }
}

/// Hashes a plaintext password using Argon2id with a random salt.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verifies a plaintext password against a stored Argon2id hash.
fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Internal(format!("invalid password hash format: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!(
            "password verification failed: {e}"
        ))),
    }
}

/// Claims payload embedded in every auth token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the identity this token was issued to.
    pub sub: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: u64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: u64,
}

/// Issues and verifies signed auth tokens.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Creates an authority signing with the given secret.
    #[must_use]
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5; // tolerate small clock skew

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_secs,
        }
    }

    /// Creates an authority with a random per-process secret.
    ///
    /// Tokens stop verifying when the process restarts; clients log in again.
    #[must_use]
    pub fn generate(ttl_secs: u64) -> Self {
        let secret: [u8; 32] = rand::rng().random();
        Self::new(&secret, ttl_secs)
    }

    /// Issues a signed token for the identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn issue(&self, identity: &str) -> Result<String, AuthError> {
        let now = now_secs();
        let claims = Claims {
            sub: identity.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {e}")))
    }

    /// Verifies a token and returns the identity it names.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExpired`] for expired tokens or
    /// [`AuthError::InvalidToken`] for anything else the decoder rejects.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AuthError::InvalidToken("invalid signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AuthError::InvalidToken("malformed token".to_string())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;
        Ok(data.claims.sub)
    }
}

/// Current time as seconds since the UNIX epoch.
fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
