use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub services: ServiceHealth,
    pub realtime_connections: usize,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: &'static str,
    pub redis: &'static str,
}

fn overall_status(db_ok: bool, redis_ok: bool) -> (&'static str, StatusCode) {
    match (db_ok, redis_ok) {
        (true, true) => ("healthy", StatusCode::OK),
        (true, false) => ("degraded", StatusCode::OK),
        (false, _) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    }
}

fn label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// GET /health
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (db_ok, redis_result) = tokio::join!(
        db::health_check(&state.db),
        state.cache.health_check(),
    );
    let redis_ok = redis_result.is_ok();

    if let Err(e) = &redis_result {
        tracing::warn!(error = %e, "Redis health check failed");
    }

    let (status, code) = overall_status(db_ok, redis_ok);

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            services: ServiceHealth {
                database: label(db_ok),
                redis: label(redis_ok),
            },
            realtime_connections: state.hub.connection_count(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_outage_is_unhealthy() {
        assert_eq!(overall_status(false, true).1, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(overall_status(false, false).0, "unhealthy");
    }

    #[test]
    fn redis_outage_only_degrades() {
        assert_eq!(overall_status(true, false), ("degraded", StatusCode::OK));
        assert_eq!(overall_status(true, true), ("healthy", StatusCode::OK));
    }
}
