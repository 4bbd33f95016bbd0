//! Remote activity indexer client.
//!
//! Talks to an HTTP service that indexes on-chain receipts by signer account.
//!
//! # API
//!
//! `GET {base}/accounts/{account_id}/activity?since={nanos}&until={nanos}`
//!
//! ```json
//! {
//!     "account_id": "jane.near",
//!     "activity": [{ "timestamp": 1640252799000000000 }]
//! }
//! ```
//!
//! `since` is inclusive and `until` exclusive, both in nanoseconds since the
//! epoch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ActivityDataSource;
use crate::error::DataSourceError;
use crate::model::ActivityEvent;

/// Client for a remote activity indexer.
#[derive(Clone)]
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn activity_url(&self, account_id: &str, since: i64, until: i64) -> String {
        format!(
            "{}/accounts/{}/activity?since={}&until={}",
            self.base_url,
            urlencoding::encode(account_id),
            since,
            until
        )
    }

    /// Fetch the raw indexer response for an account.
    pub async fn get_account_activity(
        &self,
        account_id: &str,
        since: i64,
        until: i64,
    ) -> Result<IndexerActivityResponse, DataSourceError> {
        let url = self.activity_url(account_id, since, until);

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let data = response.json::<IndexerActivityResponse>().await?;
        Ok(data)
    }
}

/// Query bounds in nanoseconds, clamped to the representable range.
fn range_nanos(since: DateTime<Utc>, until: DateTime<Utc>) -> (i64, i64) {
    (
        since.timestamp_nanos_opt().unwrap_or(i64::MIN),
        until.timestamp_nanos_opt().unwrap_or(i64::MAX),
    )
}

#[async_trait]
impl ActivityDataSource for IndexerClient {
    fn name(&self) -> &str {
        "indexer"
    }

    async fn fetch_activity(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, DataSourceError> {
        let (since, until) = range_nanos(since, until);
        let data = self.get_account_activity(account_id, since, until).await?;

        if data.account_id != account_id {
            return Err(DataSourceError::Ambiguous(format!(
                "asked for {account_id}, indexer answered for {}",
                data.account_id
            )));
        }

        debug!(
            account_id,
            rows = data.activity.len(),
            "Indexer activity received"
        );

        Ok(data.events())
    }
}

/// Indexer response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerActivityResponse {
    pub account_id: String,

    #[serde(default)]
    pub activity: Vec<IndexerActivity>,
}

impl IndexerActivityResponse {
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.activity
            .iter()
            .map(|row| ActivityEvent::from_nanos(row.timestamp))
            .collect()
    }
}

/// One receipt signed by the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerActivity {
    /// Block timestamp in nanoseconds.
    pub timestamp: i64,
}
