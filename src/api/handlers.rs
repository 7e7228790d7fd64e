//! HTTP handlers for the checker page and JSON API
//!
//! These handlers use the shared CheckerService.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::service::{CheckOutcome, CheckerService};
use crate::cache::CacheStatus;
use crate::render::{build_view, render_html};

pub const SESSION_COOKIE: &str = "checker_session";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct CheckResponse {
    #[serde(flatten)]
    pub outcome: CheckOutcome,
    pub messages: Vec<String>,
    pub referral_link: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Raw query pairs; repeated keys are allowed and the first value wins
pub type QueryPairs = Vec<(String, String)>;

fn first_param<'a>(pairs: &'a QueryPairs, name: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

pub type AppState = Arc<CheckerService>;

/// GET /?postcode=..&restart=1
pub async fn page(
    State(service): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<QueryPairs>,
) -> Response {
    let restart = matches!(first_param(&params, "restart"), Some("1") | Some("true"));
    let requested = session_cookie(&headers);
    let session = service.sessions().open(requested.as_deref(), restart).await;

    let outcome = service
        .check_in_session(&session.id, first_param(&params, "postcode"))
        .await;
    let status = match outcome {
        CheckOutcome::LoadFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let view = build_view(&outcome, &service.config().messaging);

    let mut response = (status, Html(render_html(&view))).into_response();
    if session.is_new {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, session.id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/v1/check?postcode=..
pub async fn check(
    State(service): State<AppState>,
    Query(params): Query<QueryPairs>,
) -> Result<Json<CheckResponse>, (StatusCode, Json<ErrorResponse>)> {
    let outcome = service.check(first_param(&params, "postcode")).await;
    let view = build_view(&outcome, &service.config().messaging);

    match outcome {
        CheckOutcome::MissingPostcode => Err((StatusCode::BAD_REQUEST, Json(ErrorResponse {
            error: "No valid postcode provided.".to_string()
        }))),
        CheckOutcome::LoadFailed { detail } => Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse {
            error: detail.unwrap_or_else(|| "Failed to load data.".to_string())
        }))),
        outcome => Ok(Json(CheckResponse {
            outcome,
            messages: view.notices.iter().map(|n| n.plain()).collect(),
            referral_link: view.referral_link,
        })),
    }
}

/// GET /api/v1/reference
pub async fn reference_status(State(service): State<AppState>) -> Json<CacheStatus> {
    Json(service.cache().status().await)
}

/// POST /api/v1/reference/refresh
pub async fn refresh_reference(
    State(service): State<AppState>,
) -> Result<Json<CacheStatus>, (StatusCode, Json<ErrorResponse>)> {
    match service.cache().refresh().await {
        Ok(_) => Ok(Json(service.cache().status().await)),
        Err(e) => Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { error: e.to_string() }))),
    }
}
