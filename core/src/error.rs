use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("db error: {0}")]
    Db(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Db(_) => "db",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Timeout(_) => "timeout",
        }
    }
}
