//! Sources of account activity history.
//!
//! The expiration calculator never talks to a database or indexer directly; it
//! is handed an [`ActivityDataSource`] and treats it as a read-only oracle.
//!
//! # Data Sources
//!
//! - [`Storage`](crate::storage::Storage): the local SQLite activity index
//! - [`indexer`]: a remote activity indexer spoken to over HTTP

pub mod indexer;

pub use indexer::IndexerClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DataSourceError;
use crate::model::ActivityEvent;

#[async_trait]
pub trait ActivityDataSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// All activity of `account_id` in `[since, until)`.
    ///
    /// Implementations should return events in ascending order but callers do
    /// not rely on it.
    async fn fetch_activity(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, DataSourceError>;
}
