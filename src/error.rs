//! Error types for expiration computation and activity data sources.

use thiserror::Error;

/// Failure reported by an [`ActivityDataSource`](crate::data_sources::ActivityDataSource).
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("activity source unavailable: {0}")]
    Unavailable(String),

    #[error("activity source returned an ambiguous result: {0}")]
    Ambiguous(String),
}

impl From<sqlx::Error> for DataSourceError {
    fn from(e: sqlx::Error) -> Self {
        DataSourceError::Unavailable(e.to_string())
    }
}

impl From<reqwest::Error> for DataSourceError {
    fn from(e: reqwest::Error) -> Self {
        DataSourceError::Unavailable(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ExpirationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("activity data source unavailable: {0}")]
    DataSourceUnavailable(String),

    #[error("ambiguous activity data: {0}")]
    AmbiguousResult(String),
}

impl ExpirationError {
    /// Both source failures and ambiguous answers leave the expiration unknown.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ExpirationError::DataSourceUnavailable(_) | ExpirationError::AmbiguousResult(_)
        )
    }
}

impl From<DataSourceError> for ExpirationError {
    fn from(e: DataSourceError) -> Self {
        match e {
            DataSourceError::Unavailable(msg) => ExpirationError::DataSourceUnavailable(msg),
            DataSourceError::Ambiguous(msg) => ExpirationError::AmbiguousResult(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExpirationError>;
