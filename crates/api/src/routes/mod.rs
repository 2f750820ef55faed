//! API routes

pub mod chat;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (no auth)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Bearer-authenticated chat routes
    let protected_api_routes = Router::new()
        .route("/chat/sessions/:session_id/messages", get(chat::get_messages))
        .route("/chat/messages", post(chat::send_message))
        .route("/chat/request-human", post(chat::request_human))
        .route("/admin/chat/sessions", get(chat::list_sessions))
        .route("/admin/chat/sessions/:session_id/reply", post(chat::admin_reply))
        .route("/admin/chat/sessions/:session_id/close", post(chat::close_session))
        .layer(middleware::from_fn_with_state(state.jwt.clone(), require_auth));

    // WebSocket authenticates through its own query token
    let websocket_routes = Router::new().route("/chat", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1", protected_api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use crate::ai::DisabledResponder;
    use crate::config::{Config, LogFormat};
    use crate::store::InMemorySessionStore;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use helpline_shared::Actor;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            bind_address: "127.0.0.1:0".into(),
            database_url: None,
            database_max_connections: 1,
            jwt_secret: "test-jwt-secret-must-be-at-least-32-characters-long".into(),
            jwt_expiry_hours: 1,
            ai_endpoint_url: None,
            ai_api_key: None,
            ai_timeout_ms: 100,
            ai_failure_threshold: 3,
            endpoint_queue_capacity: 8,
            need_human_debounce_secs: 60,
            disconnect_grace_secs: 0,
            max_message_bytes: 4000,
            log_format: LogFormat::Text,
        };
        AppState::new(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(DisabledResponder),
        )
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_in_memory_store() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["storage"], "healthy");
        assert_eq!(body["ai_enabled"], false);
        assert_eq!(body["websocket"]["active_connections"], 0);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/admin/chat/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert!(body["error"]["code"].is_string());
    }

    #[tokio::test]
    async fn test_admin_lists_open_sessions() {
        let state = test_state();
        let (token, _) = state
            .jwt
            .generate_token(&Actor::admin("ops@example.com"))
            .unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/admin/chat/sessions")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }
}
