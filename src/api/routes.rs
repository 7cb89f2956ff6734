//! HTTP API route definitions.

use axum::{http::Method, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    self, health, metrics, ready, status, venues, AppState, HealthResponse, ReadyResponse,
    StatsResponse, StatusResponse, VenueStatus,
};

/// OpenAPI document for the read-only API.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::ready, handlers::status, handlers::venues),
    components(schemas(HealthResponse, ReadyResponse, StatusResponse, StatsResponse, VenueStatus)),
    tags((name = "dex-arb", description = "Cross-venue arbitrage engine status"))
)]
pub struct ApiDoc;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/venues", get(venues))
        .route("/metrics", get(metrics))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::{FeedState, VenueHealth};
    use crate::venue::VenueId;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(AppState::default());
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let app = create_router(AppState::default());
        let (status, body) = get_json(app, "/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_when_ready() {
        let state = AppState::default();
        state.set_ready(true);
        let app = create_router(state);

        let (status, _) = get_json(app, "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_execution_stats() {
        let state = AppState::default().with_dry_run(false);
        state.stats.record_attempt();
        state
            .stats
            .record_success(dec!(0.69), dec!(0.000007), Duration::from_millis(40));
        let app = create_router(state);

        let (status, body) = get_json(app, "/api/v1/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "starting");
        assert_eq!(body["mode"], "live");
        assert_eq!(body["stats"]["successes"], 1);
        assert_eq!(body["stats"]["total_realized_profit"], "0.69");
        assert_eq!(body["stats"]["success_rate"], 1.0);
    }

    #[tokio::test]
    async fn venues_follow_configured_order() {
        let state = AppState::new(
            Default::default(),
            Default::default(),
            vec![VenueId::new("raydium"), VenueId::new("jupiter")],
        );
        state.health.insert(
            VenueId::new("jupiter"),
            VenueHealth {
                state: FeedState::CircuitOpen,
                consecutive_failures: 5,
                ..Default::default()
            },
        );
        state.stats.record_feed_failure(&VenueId::new("jupiter"));
        let app = create_router(state);

        let (status, body) = get_json(app, "/api/v1/venues").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["venue"], "raydium");
        assert_eq!(body[0]["state"], "idle");
        assert_eq!(body[1]["venue"], "jupiter");
        assert_eq!(body[1]["state"], "circuit_open");
        assert_eq!(body[1]["consecutive_failures"], 5);
        assert_eq!(body[1]["failures"], 1);
    }

    #[tokio::test]
    async fn metrics_without_exporter_is_404() {
        let app = create_router(AppState::default());
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn openapi_document_lists_paths() {
        let app = create_router(AppState::default());
        let (status, body) = get_json(app, "/api-docs/openapi.json").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/v1/venues"].is_object());
        assert!(body["paths"]["/health"].is_object());
    }
}
