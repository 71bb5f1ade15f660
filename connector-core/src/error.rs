//! Error taxonomy shared by the connector services.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A backend reported that current usage exceeds the requested limit
    /// for a single quota dimension. Recoverable: the transaction collects
    /// these and rolls back.
    #[error("Bad quota: {0}")]
    BadQuota(String),

    /// A user-facing failure that terminates the request with a `fail`
    /// outcome on the marketplace side.
    #[error("{0}")]
    Rejected(String),

    /// One or more quota rollbacks failed after a failed transaction.
    /// Deliberately louder than the original quota error: a half-applied
    /// backend state must not be hidden.
    #[error("Unable to roll back quotas")]
    RollbackFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Stored state that should be impossible (duplicate usage reports,
    /// unparseable report timestamps). The cycle for the affected account
    /// is abandoned, the batch continues.
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Transient backend failure (throttling, 5xx); safe to retry.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for ConnectorError {
    fn from(err: config::ConfigError) -> Self {
        ConnectorError::Config(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for ConnectorError {
    fn from(err: std::io::Error) -> Self {
        ConnectorError::Internal(anyhow::Error::new(err))
    }
}

impl ConnectorError {
    /// Map an HTTP status from a backend into the shared taxonomy.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        match status.as_u16() {
            400 => ConnectorError::BadRequest(context.to_string()),
            401 | 403 => ConnectorError::Unauthorized(context.to_string()),
            404 => ConnectorError::NotFound(context.to_string()),
            409 => ConnectorError::Conflict(context.to_string()),
            429 => ConnectorError::Unavailable(format!("{context}: throttled")),
            500..=599 => {
                ConnectorError::Unavailable(format!("{context}: status {status}"))
            }
            _ => ConnectorError::Internal(anyhow::anyhow!(
                "{context}: unexpected status {status}"
            )),
        }
    }
}
