//! Request handlers and wire types.

use crate::client::client_key;
use crate::error::ApiError;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use platecheck_core::{LookupOutcome, LookupRequest, ResultDetails};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Body of `POST /check-license-plate`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    /// Plate to look up
    #[serde(default)]
    pub license_plate: String,
    /// Site vehicle type code
    #[serde(default)]
    pub vehicle_type: String,
}

/// Successful lookup response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// The site's success flag
    pub success: bool,
    /// Result page location
    pub href: String,
    /// Error text reported by the site
    pub error: String,
    /// CAPTCHA attempts used
    pub attempts: u32,
    /// Number of violation records in `details`
    pub violation_count: usize,
    /// Parsed result page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ResultDetails>,
}

impl From<LookupOutcome> for CheckResponse {
    fn from(outcome: LookupOutcome) -> Self {
        Self {
            violation_count: outcome.violation_count(),
            success: outcome.success,
            href: outcome.href,
            error: outcome.error,
            attempts: outcome.attempts,
            details: outcome.details,
        }
    }
}

/// `POST /check-license-plate`
pub async fn check_license_plate(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckResponse>, ApiError> {
    let client = client_key(&headers, peer.map(|ConnectInfo(addr)| addr));
    state.client_limiter.acquire(&client).await;

    let payload: CheckRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(client = %client, error = %e, "rejecting malformed body");
        ApiError::InvalidBody
    })?;
    let request =
        LookupRequest::new(payload.license_plate, payload.vehicle_type).map_err(|_| ApiError::InvalidBody)?;

    let outcome = state.lookup.check_license_plate(&request).await?;
    Ok(Json(outcome.into()))
}

/// Any other method on the lookup path.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
