use std::collections::HashMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::UserCredential;
use crate::{Error, Result};

/// Fixed username → secret mapping, built once at startup and never mutated.
///
/// Secrets are held as SHA-256 digests and compared in constant time.
#[derive(Clone, Default)]
pub struct CredentialStore {
    secrets: HashMap<String, [u8; 32]>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut usernames: Vec<_> = self.secrets.keys().collect();
        usernames.sort();
        f.debug_struct("CredentialStore")
            .field("usernames", &usernames)
            .finish()
    }
}

impl CredentialStore {
    pub fn from_config(users: &[UserCredential]) -> Result<Self> {
        let mut secrets = HashMap::with_capacity(users.len());
        for (idx, user) in users.iter().enumerate() {
            let digest = if let Some(password) = user.password.as_deref() {
                secret_digest(password)?
            } else if let Some(env) = user.password_env_var.as_deref() {
                let value = std::env::var(env).map_err(|_| {
                    Error::InvalidConfig(format!(
                        "password env var {env:?} is not set or not valid UTF-8"
                    ))
                })?;
                let value = value.trim();
                if value.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "password env var {env:?} must be non-empty"
                    )));
                }
                secret_digest(value)?
            } else {
                return Err(Error::InvalidConfig(format!(
                    "users[{idx}] is missing password / password_env_var"
                )));
            };
            if secrets.insert(user.username.clone(), digest).is_some() {
                return Err(Error::InvalidConfig(format!(
                    "users[{idx}].username {:?} is duplicated",
                    user.username
                )));
            }
        }
        Ok(Self { secrets })
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let secrets = pairs
            .into_iter()
            .map(|(username, password)| (username.to_string(), hash_secret_sha256(password)))
            .collect();
        Self { secrets }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.secrets.contains_key(username)
    }

    /// True only when `username` is known and `password` matches its secret exactly.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Some(expected) = self.secrets.get(username) else {
            return false;
        };
        constant_time_eq_32(expected, &hash_secret_sha256(password))
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

fn secret_digest(secret: &str) -> Result<[u8; 32]> {
    match secret.strip_prefix("sha256:") {
        Some(hex) => parse_sha256_hex(hex),
        None => Ok(hash_secret_sha256(secret)),
    }
}

fn hash_secret_sha256(secret: &str) -> [u8; 32] {
    let digest = Sha256::digest(secret.as_bytes());
    digest.into()
}

fn parse_sha256_hex(hex: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex)
        .map_err(|err| Error::InvalidConfig(format!("invalid sha256 secret: {err}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidConfig("invalid sha256 secret length".to_string()))
}

fn constant_time_eq_32(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff: u8 = 0;
    for idx in 0..32 {
        diff |= a[idx] ^ b[idx];
    }
    diff == 0
}
