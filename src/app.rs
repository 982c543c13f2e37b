use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use sqlx::PgPool;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::JwtKeys;
use crate::config::Settings;
use crate::middleware::{request_id_layer, RequestSpan, X_REQUEST_ID};
use crate::routes;
use crate::services::{MediaClient, RealtimeHub, RedisCache};

/// Multipart framing overhead allowed on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub jwt: JwtKeys,
    pub cache: RedisCache,
    pub media: MediaClient,
    pub hub: RealtimeHub,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: Settings,
        jwt: JwtKeys,
        cache: RedisCache,
        media: MediaClient,
        hub: RealtimeHub,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            settings,
            jwt,
            cache,
            media,
            hub,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let (set_request_id, propagate_request_id) = request_id_layer();

    let body_limit = state.settings.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .merge(routes::router())
        // Applied bottom-up: the request id is set before the trace span reads it
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let mut origins = Vec::with_capacity(settings.cors_allow_origins.len());
    for origin in &settings.cors_allow_origins {
        match origin.parse::<HeaderValue>() {
            Ok(value) => origins.push(value),
            Err(_) => tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"),
        }
    }

    let request_id = HeaderName::from_static(X_REQUEST_ID);
    let preflight_cache_secs = if settings.env.is_dev() { 86_400 } else { 3_600 };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            request_id.clone(),
        ])
        .expose_headers([request_id])
        .allow_credentials(true)
        .max_age(Duration::from_secs(preflight_cache_secs))
}
