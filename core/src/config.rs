use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;
use crate::Result;

const MAX_USERS: usize = 256;
const MAX_SECRET_BYTES: usize = 4096;
const MAX_USERNAME_BYTES: usize = 256;

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserCredential {
    pub username: String,
    /// Plaintext secret or `sha256:<64 hex chars>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Read the secret from this environment variable at startup instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,
}

impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env_var", &self.password_env_var)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// Rows returned by a read-only statement; the rest of the result set is discarded.
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Wall-clock budget for a single statement execution, in milliseconds.
    #[serde(default = "default_max_io_ms")]
    pub max_io_ms: u64,
    /// Max in-flight statement executions.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Max DB connections in the service pool. The default of 1 shares one
    /// connection between all requests.
    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
    #[serde(default)]
    pub max_requests_per_ip_per_sec: u32,
    #[serde(default = "default_max_requests_burst_per_ip")]
    pub max_requests_burst_per_ip: u32,
    #[serde(default = "default_max_rate_limit_ips")]
    pub max_rate_limit_ips: u32,
}

const fn default_fetch_batch_size() -> usize {
    1
}

const fn default_max_body_bytes() -> usize {
    64 * 1024
}

const fn default_max_io_ms() -> u64 {
    30_000
}

const fn default_max_concurrency() -> usize {
    16
}

const fn default_max_db_connections() -> u32 {
    1
}

const fn default_max_requests_burst_per_ip() -> u32 {
    20
}

const fn default_max_rate_limit_ips() -> u32 {
    4096
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            fetch_batch_size: default_fetch_batch_size(),
            max_body_bytes: default_max_body_bytes(),
            max_io_ms: default_max_io_ms(),
            max_concurrency: default_max_concurrency(),
            max_db_connections: default_max_db_connections(),
            max_requests_per_ip_per_sec: 0,
            max_requests_burst_per_ip: default_max_requests_burst_per_ip(),
            max_rate_limit_ips: default_max_rate_limit_ips(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionRules {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "session".to_string()
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    #[serde(default)]
    pub users: Vec<UserCredential>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub session: SessionRules,
}

impl GateConfig {
    pub fn validate(&self) -> Result<()> {
        const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
        const MAX_FETCH_BATCH_SIZE: usize = 100_000;

        if self.limits.fetch_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "limits.fetch_batch_size must be > 0".to_string(),
            ));
        }
        if self.limits.fetch_batch_size > MAX_FETCH_BATCH_SIZE {
            return Err(Error::InvalidConfig(format!(
                "limits.fetch_batch_size is too large (max {MAX_FETCH_BATCH_SIZE})"
            )));
        }
        if self.limits.max_body_bytes == 0 {
            return Err(Error::InvalidConfig(
                "limits.max_body_bytes must be > 0".to_string(),
            ));
        }
        if self.limits.max_body_bytes > MAX_BODY_BYTES {
            return Err(Error::InvalidConfig(format!(
                "limits.max_body_bytes is too large (max {MAX_BODY_BYTES} bytes)"
            )));
        }
        if self.limits.max_io_ms == 0 {
            return Err(Error::InvalidConfig(
                "limits.max_io_ms must be > 0".to_string(),
            ));
        }
        if self.limits.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "limits.max_concurrency must be > 0".to_string(),
            ));
        }
        if self.limits.max_db_connections == 0 {
            return Err(Error::InvalidConfig(
                "limits.max_db_connections must be > 0".to_string(),
            ));
        }
        if self.limits.max_db_connections > 1024 {
            return Err(Error::InvalidConfig(
                "limits.max_db_connections is too large (max 1024)".to_string(),
            ));
        }
        if self.limits.max_requests_per_ip_per_sec > 0 && self.limits.max_requests_burst_per_ip == 0
        {
            return Err(Error::InvalidConfig(
                "limits.max_requests_burst_per_ip must be > 0 when rate limiting is enabled"
                    .to_string(),
            ));
        }

        let cookie_name = &self.session.cookie_name;
        if cookie_name.is_empty()
            || !cookie_name
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
        {
            return Err(Error::InvalidConfig(
                "session.cookie_name must be non-empty and only contain [A-Za-z0-9_-]".to_string(),
            ));
        }

        if self.users.len() > MAX_USERS {
            return Err(Error::InvalidConfig(format!(
                "users has too many entries (max {MAX_USERS})"
            )));
        }
        for (idx, user) in self.users.iter().enumerate() {
            if user.username.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "users[{idx}].username must be non-empty"
                )));
            }
            if user.username.len() > MAX_USERNAME_BYTES {
                return Err(Error::InvalidConfig(format!(
                    "users[{idx}].username is too large (max {MAX_USERNAME_BYTES} bytes)"
                )));
            }
            if user.username.chars().any(|ch| ch.is_whitespace()) {
                return Err(Error::InvalidConfig(format!(
                    "users[{idx}].username must not contain whitespace"
                )));
            }
            if self.users[..idx]
                .iter()
                .any(|other| other.username == user.username)
            {
                return Err(Error::InvalidConfig(format!(
                    "users[{idx}].username {:?} is duplicated",
                    user.username
                )));
            }
            match (user.password.as_deref(), user.password_env_var.as_deref()) {
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidConfig(format!(
                        "users[{idx}] must set only one of password / password_env_var"
                    )));
                }
                (None, None) => {
                    return Err(Error::InvalidConfig(format!(
                        "users[{idx}] is missing password / password_env_var"
                    )));
                }
                (Some(password), None) => {
                    if password.is_empty() {
                        return Err(Error::InvalidConfig(format!(
                            "users[{idx}].password must be non-empty"
                        )));
                    }
                    if password.len() > MAX_SECRET_BYTES {
                        return Err(Error::InvalidConfig(format!(
                            "users[{idx}].password is too large (max {MAX_SECRET_BYTES} bytes)"
                        )));
                    }
                    if let Some(hex) = password.strip_prefix("sha256:")
                        && (hex.len() != 64 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()))
                    {
                        return Err(Error::InvalidConfig(format!(
                            "users[{idx}].password must be sha256:<64 hex chars>"
                        )));
                    }
                }
                (None, Some(env)) => {
                    if env.trim().is_empty() {
                        return Err(Error::InvalidConfig(format!(
                            "users[{idx}].password_env_var must be non-empty"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
