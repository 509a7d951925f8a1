use crate::AppState;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::{net::SocketAddr, sync::Arc};

/// GET /:code
///
/// 1. Resolve the code through the cache-aside lookup (fast path — no DB
///    hit when warm).
/// 2. Spawn a background task to track the visit so the redirect is never
///    blocked by geo resolution or the analytics write.
/// 3. Return a 302 redirect to the long URL.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    // ── 1. Resolve URL ─────────────────────────────────────────────────────
    let record = match state.service.get_by_code(&code).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "Short link not found").into_response();
        }
        Err(e) => return e.into_response(),
    };

    // ── 2. Track the visit in the background ───────────────────────────────
    // Clone everything needed so the background task owns its data. A
    // tracking failure is logged and dropped — it must never affect the
    // redirect that triggered it.
    let ip = extract_ip(&headers, addr).unwrap_or_default();
    let state_bg = state.clone();
    let record_bg = record.clone();

    tokio::spawn(async move {
        if let Err(e) = state_bg.service.track_visit(&record_bg, &ip).await {
            tracing::error!("visit tracking failed for '{}': {}", record_bg.code, e);
        }
    });

    // ── 3. Redirect ────────────────────────────────────────────────────────
    Redirect::to(&record.long_url).into_response()
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Determine the real client IP, preferring common proxy headers.
pub(crate) fn extract_ip(headers: &HeaderMap, addr: SocketAddr) -> Option<String> {
    // X-Forwarded-For can be a comma-separated list; take the first entry.
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = xff.split(',').next().map(str::trim) {
            if !ip.is_empty() {
                return Some(ip.to_owned());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return Some(real_ip.to_owned());
        }
    }

    Some(addr.ip().to_string())
}
