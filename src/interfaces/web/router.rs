use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{productions, providers, stream};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub(crate) fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(productions::health))
        .route("/api/providers", get(providers::get_providers_endpoint))
        .route(
            "/api/productions",
            get(productions::list_productions).post(productions::create_production),
        )
        .route("/api/productions/{id}", get(productions::get_production))
        .route(
            "/api/productions/{id}/start",
            post(productions::start_production),
        )
        .route(
            "/api/productions/{id}/themes/select",
            post(productions::select_theme),
        )
        .route(
            "/api/productions/{id}/narrative/approve",
            post(productions::approve_narrative),
        )
        .route("/api/productions/{id}/retry", post(productions::retry))
        .route("/api/productions/{id}/reset", post(productions::reset))
        .route(
            "/api/productions/{id}/messages",
            get(productions::list_messages),
        )
        .route(
            "/api/productions/{id}/stream",
            get(stream::stream_production),
        )
        .route("/api/logs", get(super::sse_logs_endpoint))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StageTimeouts;
    use crate::core::memory::SqliteProductionRepository;
    use crate::core::notify::NotificationBridge;
    use crate::core::orchestrator::Orchestrator;
    use crate::core::stage::StageInvoker;
    use crate::core::testing::ScriptedProvider;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn state_with(provider: ScriptedProvider) -> AppState {
        let repo = Arc::new(SqliteProductionRepository::open_in_memory().expect("repo"));
        let invoker = StageInvoker::new(Arc::new(provider), StageTimeouts::default());
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        AppState {
            orchestrator: Orchestrator::new(repo, invoker, NotificationBridge::new(16)),
            log_tx,
            default_owner: "local".to_string(),
            provider_id: "scripted".to_string(),
            model_id: "scripted-1".to_string(),
            api_port: 17990,
        }
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    /// Creates and starts a production synchronously; returns its id.
    async fn started(app: &Router) -> String {
        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            "/api/productions?wait=true",
            Some(serde_json::json!({
                "name": "Origin Story",
                "clientContext": "Specialty coffee roaster",
                "toneOfVoice": "curious"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["production"]["stage"], "ideation");
        assert_eq!(json["production"]["status"], "touchpoint");
        json["production"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn security_headers_present_on_responses() {
        let app = build_api_router(state_with(ScriptedProvider::new()));
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn health_reports_the_active_provider() {
        let app = build_api_router(state_with(ScriptedProvider::new()));
        let (status, json) = json_request(app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["provider"], "scripted");
    }

    #[tokio::test]
    async fn full_flow_over_http() {
        let app = build_api_router(state_with(ScriptedProvider::happy_path()));
        let id = started(&app).await;

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            &format!("/api/productions/{}/themes/select?wait=true", id),
            Some(serde_json::json!({ "index": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["production"]["stage"], "narrative");
        assert_eq!(json["production"]["status"], "touchpoint");

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            &format!("/api/productions/{}/narrative/approve?wait=true", id),
            Some(serde_json::json!({ "angle": "PROVOCATIVO" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["production"]["status"], "completed");
        assert_eq!(json["production"]["selectedAngle"], "Provocativo");
        assert!(json["production"]["finalContent"]["fullScript"]["hook"].is_string());

        let (status, json) = json_request(
            app,
            Method::GET,
            &format!("/api/productions/{}/messages?after=6", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["sequence"], 7);
    }

    #[tokio::test]
    async fn errors_map_to_status_and_code() {
        let app = build_api_router(state_with(ScriptedProvider::happy_path()));
        let id = started(&app).await;

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            &format!("/api/productions/{}/themes/select", id),
            Some(serde_json::json!({ "index": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "validation_error");

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            &format!("/api/productions/{}/retry", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["code"], "invalid_transition");

        let (status, json) =
            json_request(app, Method::GET, "/api/productions/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "not_found");
    }

    #[tokio::test]
    async fn blank_context_on_create_leaves_no_row() {
        let app = build_api_router(state_with(ScriptedProvider::happy_path()));
        for path in ["/api/productions", "/api/productions?wait=true"] {
            let (status, json) = json_request(
                app.clone(),
                Method::POST,
                path,
                Some(serde_json::json!({ "name": "X", "clientContext": "   " })),
            )
            .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(json["code"], "validation_error");
        }

        let (status, json) = json_request(app, Method::GET, "/api/productions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["productions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn detached_create_with_context_starts_right_away() {
        let app = build_api_router(state_with(ScriptedProvider::happy_path()));
        let (status, json) = json_request(
            app,
            Method::POST,
            "/api/productions",
            Some(serde_json::json!({ "name": "Now", "clientContext": "Roaster" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["production"]["status"], "in_progress");
        assert_eq!(json["production"]["ownerId"], "local");
    }

    #[tokio::test]
    async fn detached_start_returns_the_claim() {
        let app = build_api_router(state_with(ScriptedProvider::happy_path()));
        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            "/api/productions",
            Some(serde_json::json!({ "name": "Later", "ownerId": "team-a" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["production"]["status"], "pending");
        assert_eq!(json["production"]["ownerId"], "team-a");
        let id = json["production"]["id"].as_str().unwrap().to_string();

        let (status, json) = json_request(
            app.clone(),
            Method::POST,
            &format!("/api/productions/{}/start", id),
            Some(serde_json::json!({ "clientContext": "Roaster" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        assert_eq!(json["production"]["status"], "in_progress");

        let (_, json) = json_request(
            app,
            Method::GET,
            "/api/productions?owner=team-a",
            None,
        )
        .await;
        assert_eq!(json["productions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stream_endpoint_speaks_sse_and_404s_unknown_ids() {
        let app = build_api_router(state_with(ScriptedProvider::happy_path()));
        let id = started(&app).await;

        let req = Request::builder()
            .uri(format!("/api/productions/{}/stream?after=0", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let req = Request::builder()
            .uri("/api/productions/missing/stream")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn providers_catalog_is_listed() {
        let app = build_api_router(state_with(ScriptedProvider::new()));
        let (status, json) = json_request(app, Method::GET, "/api/providers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            json["providers"]
                .as_array()
                .unwrap()
                .iter()
                .any(|p| p["id"] == "openai")
        );
    }
}
