//! Inactivity-window expiration.
//!
//! A certificate expires at the end of the first run of `threshold_days`
//! consecutive days without activity after issuance. If the holder never went
//! quiet that long, it expires `threshold_days` after their most recent
//! activity, or after issuance when there was no activity at all.
//!
//! ```text
//! issued_at        a1     a2                  a3      a4
//!     |------------|------|-------------------|-------|-----> now
//!      boundary gap  gap        gap (>= T)      gap
//!                              ^ qualifying: expires at a2 + T
//! ```
//!
//! Gaps are measured in whole UTC calendar days. The boundary gap (issuance to
//! first activity) competes with interior gaps on equal terms: the earliest
//! window that meets the threshold wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use tracing::{debug, instrument, warn};

use crate::data_sources::ActivityDataSource;
use crate::error::{ExpirationError, Result};
use crate::model::{ActivityEvent, DateFormat, Expiration, ExpirationBasis, InactivityWindow};

/// Days of continuous inactivity after which a certificate expires.
pub const DEFAULT_THRESHOLD_DAYS: u32 = 180;

/// How long a gap has to be before it expires a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub threshold_days: u32,

    /// `true`: a gap of exactly `threshold_days` qualifies (`>=`).
    /// `false`: it has to be strictly longer (`>`).
    pub inclusive: bool,
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            threshold_days: DEFAULT_THRESHOLD_DAYS,
            inclusive: true,
        }
    }
}

impl ExpirationPolicy {
    pub fn qualifies(&self, gap_days: i64) -> bool {
        let threshold = i64::from(self.threshold_days);
        if self.inclusive {
            gap_days >= threshold
        } else {
            gap_days > threshold
        }
    }
}

/// Whole UTC calendar days from `from` to `to`.
pub fn whole_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn shift_days(instant: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| instant.checked_add_signed(delta))
        .ok_or_else(|| {
            ExpirationError::InvalidInput(format!(
                "{instant} shifted by {days} days is out of range"
            ))
        })
}

/// Closed inactivity windows over `events` (sorted ascending).
///
/// The first window is the boundary window starting at `issued_at`; every
/// later one starts at the previous activity.
pub fn inactivity_windows(
    issued_at: DateTime<Utc>,
    events: &[ActivityEvent],
) -> impl Iterator<Item = InactivityWindow> + '_ {
    let starts = std::iter::once(issued_at).chain(events.iter().map(|e| e.timestamp));

    starts.zip(events.iter()).map(|(start, end)| InactivityWindow {
        start,
        end: Some(end.timestamp),
        gap_days: whole_days_between(start, end.timestamp),
    })
}

/// The open window from the last activity (or issuance) up to `now`.
pub fn trailing_window(
    issued_at: DateTime<Utc>,
    events: &[ActivityEvent],
    now: DateTime<Utc>,
) -> InactivityWindow {
    let start = events.last().map_or(issued_at, |e| e.timestamp);

    InactivityWindow {
        start,
        end: None,
        gap_days: whole_days_between(start, now),
    }
}

/// The earliest window meeting the policy threshold, tagged as boundary or
/// interior.
pub fn find_qualifying_window(
    issued_at: DateTime<Utc>,
    events: &[ActivityEvent],
    policy: &ExpirationPolicy,
) -> Option<ExpirationBasis> {
    inactivity_windows(issued_at, events)
        .enumerate()
        .find(|(_, window)| policy.qualifies(window.gap_days))
        .map(|(index, window)| {
            if index == 0 {
                ExpirationBasis::BoundaryGap(window)
            } else {
                ExpirationBasis::InactivityGap(window)
            }
        })
}

/// Expiration counted back from the end of a qualifying window:
/// `end - (gap_days - threshold)`.
///
/// Lands on the same UTC date as `start + threshold`. `None` for open windows.
pub fn expiration_from_resumption(
    window: &InactivityWindow,
    policy: &ExpirationPolicy,
) -> Option<DateTime<Utc>> {
    let end = window.end?;
    let overshoot = window.gap_days - i64::from(policy.threshold_days);
    shift_days(end, -overshoot).ok()
}

/// Compute the expiration for an activity history that has already been fetched.
///
/// `events` may arrive in any order and may contain duplicates.
pub fn expiration_from_events(
    issued_at: DateTime<Utc>,
    mut events: Vec<ActivityEvent>,
    policy: &ExpirationPolicy,
) -> Result<Expiration> {
    events.sort_unstable();

    let basis = find_qualifying_window(issued_at, &events, policy).unwrap_or_else(|| {
        events
            .last()
            .map_or(ExpirationBasis::NoActivity, |last| {
                ExpirationBasis::MostRecentActivity(last.timestamp)
            })
    });

    let reference = match basis {
        ExpirationBasis::BoundaryGap(window) | ExpirationBasis::InactivityGap(window) => {
            window.start
        }
        ExpirationBasis::MostRecentActivity(last) => last,
        ExpirationBasis::NoActivity => issued_at,
    };

    let expires_at = shift_days(reference, i64::from(policy.threshold_days))?;

    debug_assert!(basis.window().is_none_or(|window| {
        expiration_from_resumption(window, policy).map(|at| at.date_naive())
            == Some(expires_at.date_naive())
    }));

    Ok(Expiration {
        issued_at,
        expires_at,
        basis,
    })
}

/// Parse an issuance instant.
///
/// Accepts integer milliseconds since the epoch (the NFT metadata convention),
/// RFC 3339, or a bare `YYYY-MM-DD` taken as UTC midnight.
pub fn parse_issued_at(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExpirationError::InvalidInput("issued_at is empty".to_string()));
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| {
                ExpirationError::InvalidInput(format!("issued_at {raw:?} is out of range"))
            });
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| ExpirationError::InvalidInput(format!("issued_at {raw:?} is not a date")))
}

/// Account ids are opaque but must be non-empty and free of whitespace and
/// control characters.
pub fn validate_account_id(account_id: &str) -> Result<()> {
    if account_id.is_empty() {
        return Err(ExpirationError::InvalidInput("account_id is empty".to_string()));
    }
    if account_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ExpirationError::InvalidInput(format!(
            "account_id {account_id:?} contains whitespace or control characters"
        )));
    }
    Ok(())
}

pub fn format_expiration(instant: DateTime<Utc>, format: DateFormat) -> String {
    match format {
        DateFormat::Date => instant.format("%Y-%m-%d").to_string(),
        DateFormat::DateTime => instant.format("%Y-%m-%d %H:%M").to_string(),
    }
}

/// Fetches activity from an [`ActivityDataSource`] and applies the policy.
#[derive(Clone)]
pub struct ExpirationCalculator {
    source: Arc<dyn ActivityDataSource>,
    policy: ExpirationPolicy,
    timeout: Duration,
}

impl ExpirationCalculator {
    pub fn new(
        source: Arc<dyn ActivityDataSource>,
        policy: ExpirationPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            policy,
            timeout,
        }
    }

    /// Validate raw inputs, then compute the expiration.
    ///
    /// Invalid input is rejected before the data source is queried.
    pub async fn compute_expiration(
        &self,
        account_id: &str,
        issued_at: &str,
        now: DateTime<Utc>,
    ) -> Result<Expiration> {
        validate_account_id(account_id)?;
        let issued_at = parse_issued_at(issued_at)?;
        self.expiration_for(account_id, issued_at, now).await
    }

    /// Compute the expiration for an already-parsed issuance instant.
    ///
    /// Activity is read from `[issued_at, start of today)`, so activity on the
    /// current day only counts from tomorrow on.
    #[instrument(skip(self))]
    pub async fn expiration_for(
        &self,
        account_id: &str,
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Expiration> {
        validate_account_id(account_id)?;

        let until = start_of_day(now);
        if issued_at >= until {
            debug!("issued today, no activity to inspect");
            return expiration_from_events(issued_at, Vec::new(), &self.policy);
        }

        let fetch = self.source.fetch_activity(account_id, issued_at, until);
        let mut events = match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    source = self.source.name(),
                    timeout = ?self.timeout,
                    "Activity source timed out"
                );
                return Err(ExpirationError::DataSourceUnavailable(format!(
                    "{} did not answer within {:?}",
                    self.source.name(),
                    self.timeout
                )));
            }
        };

        if let Some(stray) = events
            .iter()
            .find(|e| e.timestamp < issued_at || e.timestamp >= until)
        {
            return Err(ExpirationError::AmbiguousResult(format!(
                "{} returned activity at {} outside [{issued_at}, {until})",
                self.source.name(),
                stray.timestamp
            )));
        }

        events.sort_unstable();
        debug!(
            source = self.source.name(),
            events = events.len(),
            days_since_last_activity = trailing_window(issued_at, &events, until).gap_days,
            "Activity fetched"
        );

        expiration_from_events(issued_at, events, &self.policy)
    }
}
