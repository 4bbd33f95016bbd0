//! HTTP API handlers for cert-expiry.
//!
//! - **POST /activity**: feeds the local activity index.
//! - **GET /expiration**: computes an expiration for an account and issuance
//!   instant. Fails with 503 when the activity source cannot answer.
//! - **POST /certificates** / **GET /certificates/{token_id}**: issuance records
//!   and the certificate view built from them. The view degrades to "no
//!   expiration" instead of failing when the activity source is down.
//!
//! Successful expiration-bearing responses carry a `Cache-Control` header;
//! expirations only move once a day.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::ExpirationError;
use crate::expiration::{
    ExpirationCalculator, format_expiration, parse_issued_at, validate_account_id,
};
use crate::model::{
    ActivityEvent, ActivityRequest, CertificateRequest, CertificateView, DateFormat,
    ExpirationQuery, ExpirationResponse, IssuanceRecord,
};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub calculator: ExpirationCalculator,
    pub cache_seconds: u32,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/activity", post(post_activity))
        .route("/expiration", get(get_expiration))
        .route("/certificates", post(post_certificate))
        .route("/certificates/:token_id", get(get_certificate))
        .route("/health", get(health_check))
        .with_state(state)
}

fn cache_header(seconds: u32) -> (header::HeaderName, HeaderValue) {
    let value = HeaderValue::from_str(&format!("public, s-maxage={seconds}"))
        .unwrap_or_else(|_| HeaderValue::from_static("no-store"));
    (header::CACHE_CONTROL, value)
}

fn status_for(error: &ExpirationError) -> StatusCode {
    match error {
        ExpirationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ExpirationError::DataSourceUnavailable(_) | ExpirationError::AmbiguousResult(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// POST /activity - Add an event to the local activity index.
///
/// # Request Body
///
/// ```json
/// {
///     "account_id": "jane.near",
///     "timestamp_nanos": 1640252799000000000
/// }
/// ```
///
/// `timestamp_nanos` is optional and defaults to server time.
///
/// # Response
///
/// Returns `202 Accepted` on success.
#[instrument(skip(state, request), fields(account_id))]
pub async fn post_activity(
    State(state): State<AppState>,
    Json(request): Json<ActivityRequest>,
) -> StatusCode {
    tracing::Span::current().record("account_id", request.account_id.as_str());

    if let Err(e) = validate_account_id(&request.account_id) {
        warn!(error = %e, "Rejected activity");
        return StatusCode::BAD_REQUEST;
    }

    let event = request
        .timestamp_nanos
        .map_or_else(|| ActivityEvent::new(Utc::now()), ActivityEvent::from_nanos);

    match state.storage.insert_activity(&request.account_id, &event).await {
        Ok(()) => {
            let total = state.storage.activity_count(&request.account_id).await.ok();
            info!(timestamp = %event.timestamp, total = ?total, "Activity recorded");
            StatusCode::ACCEPTED
        }
        Err(e) => {
            warn!(error = %e, "Failed to record activity");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /expiration - Compute a certificate expiration.
///
/// # Query Parameters
///
/// - `account_id` (required): certificate holder
/// - `issued_at` (required): milliseconds since epoch, RFC 3339, or `YYYY-MM-DD`
/// - `format` (optional): `date` (default) or `datetime`
///
/// # Response
///
/// ```json
/// {
///     "account_id": "jane.near",
///     "issued_at": "2021-03-02T00:00:00Z",
///     "expiration": "2021-08-29",
///     "basis": "boundary_gap",
///     "gap_days": 296,
///     "expired": true
/// }
/// ```
#[instrument(skip(state))]
pub async fn get_expiration(
    State(state): State<AppState>,
    Query(query): Query<ExpirationQuery>,
) -> Result<Response, StatusCode> {
    let now = Utc::now();

    let expiration = state
        .calculator
        .compute_expiration(&query.account_id, &query.issued_at, now)
        .await
        .map_err(|e| {
            warn!(
                account_id = %query.account_id,
                error = %e,
                "Failed to compute expiration"
            );
            status_for(&e)
        })?;

    let response = ExpirationResponse {
        account_id: query.account_id.clone(),
        issued_at: expiration.issued_at,
        expiration: format_expiration(expiration.expires_at, query.format),
        basis: expiration.basis.kind(),
        gap_days: expiration.basis.window().map(|w| w.gap_days),
        expired: expiration.is_expired(now),
    };

    info!(
        account_id = %response.account_id,
        expiration = %response.expiration,
        basis = ?response.basis,
        "Expiration computed"
    );

    Ok(([cache_header(state.cache_seconds)], Json(response)).into_response())
}

/// POST /certificates - Store an issuance record.
///
/// # Response
///
/// `201 Created`, `409 Conflict` if the token id is already taken, or
/// `400 Bad Request` for malformed input.
#[instrument(skip(state, request), fields(token_id))]
pub async fn post_certificate(
    State(state): State<AppState>,
    Json(request): Json<CertificateRequest>,
) -> StatusCode {
    tracing::Span::current().record("token_id", request.token_id.as_str());

    let token_id = request.token_id.trim();
    if token_id.is_empty() {
        warn!("Rejected certificate without token id");
        return StatusCode::BAD_REQUEST;
    }

    let issued_at = match validate_account_id(&request.account_id)
        .and_then(|()| parse_issued_at(&request.issued_at))
    {
        Ok(issued_at) => issued_at,
        Err(e) => {
            warn!(error = %e, "Rejected certificate");
            return StatusCode::BAD_REQUEST;
        }
    };

    let record = IssuanceRecord {
        token_id: token_id.to_string(),
        account_id: request.account_id,
        issued_at,
        title: request.title,
    };

    match state.storage.insert_certificate(&record).await {
        Ok(true) => {
            info!(account_id = %record.account_id, "Certificate recorded");
            StatusCode::CREATED
        }
        Ok(false) => {
            warn!("Certificate already exists");
            StatusCode::CONFLICT
        }
        Err(e) => {
            warn!(error = %e, "Failed to record certificate");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /certificates/{token_id} - Certificate view with its expiration.
///
/// When the activity source is unavailable, `expiration` and `expired` are
/// `null` and the certificate is still returned.
#[instrument(skip(state))]
pub async fn get_certificate(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Result<Response, StatusCode> {
    let now = Utc::now();

    let record = match state.storage.get_certificate(&token_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(error = %e, "Failed to load certificate");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let expiration = match state
        .calculator
        .expiration_for(&record.account_id, record.issued_at, now)
        .await
    {
        Ok(expiration) => Some(expiration),
        Err(e) if e.is_unavailable() => {
            warn!(
                account_id = %record.account_id,
                error = %e,
                "Rendering certificate without expiration"
            );
            None
        }
        Err(e) => {
            warn!(account_id = %record.account_id, error = %e, "Stored certificate is invalid");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let view = CertificateView {
        token_id: record.token_id,
        account_id: record.account_id,
        title: record.title,
        issued: format_expiration(record.issued_at, DateFormat::Date),
        expiration: expiration.map(|e| format_expiration(e.expires_at, DateFormat::Date)),
        expired: expiration.map(|e| e.is_expired(now)),
    };

    // A view without an expiration should not be cached.
    if view.expiration.is_none() {
        return Ok(Json(view).into_response());
    }

    Ok(([cache_header(state.cache_seconds)], Json(view)).into_response())
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_errors() {
        assert_eq!(
            status_for(&ExpirationError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ExpirationError::AmbiguousResult("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_cache_header() {
        let (name, value) = cache_header(600);

        assert_eq!(name, header::CACHE_CONTROL);
        assert_eq!(value, "public, s-maxage=600");
    }
}
