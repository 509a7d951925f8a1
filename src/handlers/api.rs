use crate::{
    error::{Result, ServiceError},
    models::{ShortenedUrl, VisitorAddress},
    AppState,
};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};

use super::{redirect::extract_ip, ApiResponse};

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    pub long_url: String,
}

/// POST /api/shorten
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ShortenRequest>,
) -> Result<Json<ApiResponse<ShortenedUrl>>> {
    let record = state.service.shorten(&request.long_url).await?;
    Ok(Json(ApiResponse::success(
        record,
        "URL shortened successfully",
    )))
}

/// GET /api/history/:code
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<ShortenedUrl>>> {
    match state.service.get_history(&code).await? {
        Some(record) => Ok(Json(ApiResponse::success(
            record,
            "URL history retrieved successfully",
        ))),
        None => Err(ServiceError::NotFound(format!(
            "no URL found with code: {code}"
        ))),
    }
}

/// GET /api/visitor-details
///
/// The IP comes from proxy headers when present, else from the connection
/// itself.
pub async fn visitor_details(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<VisitorAddress>>> {
    let ip = extract_ip(&headers, addr).unwrap_or_default();
    match state.service.get_visitor_details(&ip).await? {
        Some(details) => Ok(Json(ApiResponse::success(
            details,
            "Address found for visitor IP",
        ))),
        None => Err(ServiceError::NotFound(format!(
            "no address found for IP: {ip}"
        ))),
    }
}
