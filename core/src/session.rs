//! Stateless session tokens.
//!
//! A token is `<hex(username)>.<hex(HMAC-SHA256(signing key, username))>`. Nothing is
//! stored server side: a token stays valid for as long as the process keeps its
//! signing key. The key is generated at startup and is never persisted or rotated,
//! so a restart invalidates every session and a long-running process never
//! expires one.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use sha2::Sha256;

use crate::credentials::CredentialStore;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNING_KEY_LEN: usize = 32;

const MAX_TOKEN_BYTES: usize = 4096;

#[derive(Clone)]
pub struct SigningKey(String);

impl SigningKey {
    /// 32 random alphanumeric characters from the OS RNG.
    pub fn generate() -> Self {
        let key = OsRng
            .sample_iter(&Alphanumeric)
            .take(SIGNING_KEY_LEN)
            .map(char::from)
            .collect();
        Self(key)
    }

    pub fn from_secret(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated(String),
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginResult {
    Success {
        username: String,
        token: SessionToken,
    },
    InvalidCredentials,
}

pub struct SessionAuthenticator {
    credentials: CredentialStore,
    mac: HmacSha256,
}

impl fmt::Debug for SessionAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuthenticator")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl SessionAuthenticator {
    pub fn new(credentials: CredentialStore, key: &SigningKey) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|err| Error::InvalidConfig(format!("invalid signing key: {err}")))?;
        Ok(Self { credentials, mac })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn login(&self, username: &str, password: &str) -> LoginResult {
        if !self.credentials.verify(username, password) {
            return LoginResult::InvalidCredentials;
        }
        LoginResult::Success {
            username: username.to_string(),
            token: self.sign(username),
        }
    }

    pub fn authenticate(&self, token: Option<&str>) -> AuthResult {
        let Some(username) = token.and_then(|token| self.verify(token)) else {
            return AuthResult::Unauthenticated;
        };
        if !self.credentials.contains(&username) {
            return AuthResult::Unauthenticated;
        }
        AuthResult::Authenticated(username)
    }

    fn sign(&self, username: &str) -> SessionToken {
        let mut mac = self.mac.clone();
        mac.update(username.as_bytes());
        let tag = mac.finalize().into_bytes();
        SessionToken(format!(
            "{}.{}",
            hex::encode(username.as_bytes()),
            hex::encode(tag)
        ))
    }

    fn verify(&self, token: &str) -> Option<String> {
        if token.len() > MAX_TOKEN_BYTES {
            return None;
        }
        let (payload_hex, tag_hex) = token.split_once('.')?;
        let payload = hex::decode(payload_hex).ok()?;
        let tag = hex::decode(tag_hex).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&tag).ok()?;

        String::from_utf8(payload).ok()
    }
}
