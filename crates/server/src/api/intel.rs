//! Intelligence API handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use argus_core::{IntelResponse, LookupError, ServiceStatus};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IntelSearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub services: Vec<ServiceStatus>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /api/v1/intel/search
///
/// Classify the query and aggregate every relevant intelligence source.
/// Blank queries are rejected here, before the engine runs; everything else
/// answers 200 with per-service partial results.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IntelSearchRequest>,
) -> Result<Json<IntelResponse>, (StatusCode, Json<ErrorResponse>)> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "query must not be empty".to_string(),
            }),
        ));
    }

    match state.aggregator().lookup(query).await {
        Ok(response) => Ok(Json(response)),
        Err(LookupError::EmptyQuery) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: LookupError::EmptyQuery.to_string(),
            }),
        )),
    }
}

/// GET /api/v1/intel/services
///
/// List every adapter with its credential status and rate limit.
pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: state.aggregator().service_status(),
    })
}
