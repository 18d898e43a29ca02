use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("No available domains")]
    NoDomainAvailable,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for MailError {
    fn from(err: config::ConfigError) -> Self {
        MailError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
