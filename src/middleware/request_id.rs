//! Request id propagation and per-request tracing spans

use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::MakeSpan;
use tracing::Span;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layers that assign a UUID request id when the client sent none and echo it
/// back on the response.
pub fn request_id_layer() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    let header_name = HeaderName::from_static(X_REQUEST_ID);

    (
        SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid),
        PropagateRequestIdLayer::new(header_name),
    )
}

/// Span carrying method, path and request id so every handler log line can be
/// correlated with the response header.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    fn echo_router() -> Router {
        let (set, propagate) = request_id_layer();
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(propagate)
            .layer(set)
    }

    #[test]
    fn span_is_built_without_request_id() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let _span = RequestSpan.make_span(&request);
    }

    #[tokio::test]
    async fn generates_request_id_when_missing() {
        let response = echo_router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn echoes_client_request_id() {
        let request = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = echo_router().oneshot(request).await.unwrap();

        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "abc-123");
    }
}
