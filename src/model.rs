//! Data models for cert-expiry.
//!
//! Activity events, issuance records and the inactivity windows derived from
//! them, plus the request/response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single on-chain action attributed to an account.
///
/// The indexer reports timestamps in nanoseconds since the Unix epoch; they are
/// converted to `DateTime<Utc>` at the boundary and only converted back when
/// written to storage or sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }

    /// Build an event from an indexer timestamp in nanoseconds.
    pub fn from_nanos(nanos: i64) -> Self {
        Self {
            timestamp: DateTime::from_timestamp_nanos(nanos),
        }
    }

    /// Nanoseconds since the epoch, or `None` outside the representable range
    /// (roughly 1677..2262).
    pub fn nanos(&self) -> Option<i64> {
        self.timestamp.timestamp_nanos_opt()
    }
}

/// The moment a certificate was minted for an account.
///
/// Issuance records are write-once: storage refuses to replace an existing
/// `token_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    pub token_id: String,
    pub account_id: String,
    pub issued_at: DateTime<Utc>,
    pub title: Option<String>,
}

/// A span without recorded activity.
///
/// `start` is the last activity before the silence (or the issuance instant for
/// the boundary window), `end` the activity that broke it. An open window
/// (`end == None`) runs up to the reference instant it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InactivityWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub gap_days: i64,
}

/// Which rule produced an expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationBasis {
    /// Silence between issuance and the first activity met the threshold.
    BoundaryGap(InactivityWindow),
    /// Silence between two activities met the threshold.
    InactivityGap(InactivityWindow),
    /// No window qualified; counted from the latest activity.
    MostRecentActivity(DateTime<Utc>),
    /// No activity since issuance.
    NoActivity,
}

impl ExpirationBasis {
    pub fn kind(&self) -> BasisKind {
        match self {
            ExpirationBasis::BoundaryGap(_) => BasisKind::BoundaryGap,
            ExpirationBasis::InactivityGap(_) => BasisKind::InactivityGap,
            ExpirationBasis::MostRecentActivity(_) => BasisKind::MostRecentActivity,
            ExpirationBasis::NoActivity => BasisKind::NoActivity,
        }
    }

    /// The qualifying window, if one was found.
    pub fn window(&self) -> Option<&InactivityWindow> {
        match self {
            ExpirationBasis::BoundaryGap(window) | ExpirationBasis::InactivityGap(window) => {
                Some(window)
            }
            _ => None,
        }
    }
}

/// Wire name of an [`ExpirationBasis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisKind {
    BoundaryGap,
    InactivityGap,
    MostRecentActivity,
    NoActivity,
}

/// Result of an expiration computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub basis: ExpirationBasis,
}

impl Expiration {
    /// Whether the expiration lies before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// How an expiration instant is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    /// `YYYY-MM-DD`
    #[default]
    Date,
    /// `YYYY-MM-DD HH:MM`
    DateTime,
}

/// Request body for POST /activity.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRequest {
    pub account_id: String,

    /// Indexer timestamp in nanoseconds; defaults to server time.
    #[serde(default)]
    pub timestamp_nanos: Option<i64>,
}

/// Query parameters for GET /expiration.
#[derive(Debug, Deserialize)]
pub struct ExpirationQuery {
    pub account_id: String,

    /// Milliseconds since epoch, RFC 3339, or `YYYY-MM-DD`.
    pub issued_at: String,

    #[serde(default)]
    pub format: DateFormat,
}

/// Response for GET /expiration.
#[derive(Debug, Clone, Serialize)]
pub struct ExpirationResponse {
    pub account_id: String,
    pub issued_at: DateTime<Utc>,
    pub expiration: String,
    pub basis: BasisKind,

    /// Length of the qualifying window, when the basis has one.
    pub gap_days: Option<i64>,

    pub expired: bool,
}

/// Request body for POST /certificates.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateRequest {
    pub token_id: String,
    pub account_id: String,

    /// Same formats as [`ExpirationQuery::issued_at`].
    pub issued_at: String,

    #[serde(default)]
    pub title: Option<String>,
}

/// Response for GET /certificates/{token_id}.
///
/// `expiration` and `expired` are `None` when the activity source could not be
/// reached; the certificate itself is still shown.
///
/// Serialized as JSON `null`, which stands for "unavailable" in the display.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateView {
    pub token_id: String,
    pub account_id: String,
    pub title: Option<String>,
    pub issued: String,
    pub expiration: Option<String>,
    pub expired: Option<bool>,
}
