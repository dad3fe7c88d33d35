use crate::auth;
use crate::state::AppState;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", auth::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use axum::body::Body;
    use axum::extract::FromRef;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn john() -> Value {
        json!({
            "username": "johndoe",
            "email": "john@example.com",
            "password": "SecurePass123"
        })
    }

    #[tokio::test]
    async fn register_then_login_end_to_end() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let app = build_app(state);

        let (status, user) = call(&app, post_json("/api/auth/register", john())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(user["id"].is_string());
        assert_eq!(user["username"], "johndoe");
        assert_eq!(user["email"], "john@example.com");
        assert!(user["created_at"].is_string());
        assert!(user.get("password").is_none());
        assert!(user.get("password_hash").is_none());

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/login",
                json!({ "email": "john@example.com", "password": "SecurePass123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["user"], user);
        let token = body["access_token"].as_str().expect("token string");
        assert!(!token.is_empty());
        let claims = keys.verify(token).expect("token verifies");
        assert_eq!(claims.sub.to_string(), user["id"].as_str().unwrap());

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/login",
                json!({ "email": "john@example.com", "password": "wrong" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid email or password");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let app = build_app(AppState::fake());
        call(&app, post_json("/api/auth/register", john())).await;

        let unknown = call(
            &app,
            post_json(
                "/api/auth/login",
                json!({ "email": "ghost@example.com", "password": "SecurePass123" }),
            ),
        )
        .await;
        let wrong = call(
            &app,
            post_json(
                "/api/auth/login",
                json!({ "email": "john@example.com", "password": "NotMyPass123" }),
            ),
        )
        .await;
        assert_eq!(unknown.0, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, wrong);
    }

    #[tokio::test]
    async fn duplicate_registration_is_400_with_field() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, post_json("/api/auth/register", john())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/register",
                json!({ "username": "johndoe", "email": "other@example.com", "password": "SecurePass123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Username already exists");

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/register",
                json!({ "username": "janedoe", "email": "john@example.com", "password": "SecurePass123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Email already exists");
    }

    #[tokio::test]
    async fn malformed_registration_is_400() {
        let app = build_app(AppState::fake());

        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/register",
                json!({ "username": "jo", "email": "john@example.com", "password": "SecurePass123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Username must be 3-50 characters");

        let (status, _) = call(
            &app,
            post_json("/api/auth/register", json!({ "username": "johndoe" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn overlong_email_is_400_invalid_email() {
        let app = build_app(AppState::fake());
        let email = format!("{}@example.com", "a".repeat(300));
        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/register",
                json!({ "username": "johndoe", "email": email, "password": "SecurePass123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid email");
    }

    #[tokio::test]
    async fn control_characters_are_400() {
        let app = build_app(AppState::fake());
        let cases = [
            (
                json!({ "username": "nul\u{0}user", "email": "john@example.com", "password": "SecurePass123" }),
                "Username contains invalid characters",
            ),
            (
                json!({ "username": "johndoe", "email": "john\u{0}@example.com", "password": "SecurePass123" }),
                "Invalid email",
            ),
            (
                json!({ "username": "johndoe", "email": "john@example.com", "password": "Secure\u{0}Pass123" }),
                "Password contains invalid characters",
            ),
        ];
        for (payload, detail) in cases {
            let (status, body) = call(&app, post_json("/api/auth/register", payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["detail"], detail);
        }
    }

    #[tokio::test]
    async fn login_with_malformed_email_is_400() {
        let app = build_app(AppState::fake());
        let (status, body) = call(
            &app,
            post_json(
                "/api/auth/login",
                json!({ "email": "not-an-email", "password": "SecurePass123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid email");
    }

    #[tokio::test]
    async fn me_requires_valid_token() {
        let app = build_app(AppState::fake());
        let (_, user) = call(&app, post_json("/api/auth/register", john())).await;
        let (_, login) = call(
            &app,
            post_json(
                "/api/auth/login",
                json!({ "email": "john@example.com", "password": "SecurePass123" }),
            ),
        )
        .await;
        let token = login["access_token"].as_str().unwrap();

        let (status, me) = call(&app, get_with_token("/api/auth/me", token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, user);

        let (status, _) = call(&app, get_with_token("/api/auth/me", "garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let missing = Request::builder()
            .uri("/api/auth/me")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&app, missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Missing Authorization header");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
