//! Example handlers.

use axum::{Json, http::StatusCode};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::api_auth::Authenticity;

/// Echo the parsed body of authentic requests.
pub async fn example_post(authenticity: Authenticity) -> String {
    if authenticity.is_authentic() {
        let media = authenticity
            .media()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "null".to_string());
        format!("Request Authenticated: {}\n", media)
    } else {
        "Received an Unauthenticated request\n".to_string()
    }
}

pub async fn example_get() -> &'static str {
    "Success"
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    pub timestamp_ms: u64,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (StatusCode::OK, Json(HealthResponse { timestamp_ms }))
}
