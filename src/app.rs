use anyhow::{Context, Result};
use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::extractors::DEVICE_ID_HEADER;
use crate::auth::jwt::JwtManager;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh::RefreshPolicy;
use crate::auth::services::SessionService;
use crate::config::Config;
use crate::db::Stores;
use crate::email::{
    EmailDispatcher, EmailSender, EmailWorkerConfig, LogEmailSender, WebhookEmailSender,
};
use crate::handlers::auth::{
    login, logout, logout_all, refresh, register, resend_code, send_receipt, verify_email,
};
use crate::handlers::health::health;

const EMAIL_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub path: String,
    pub secure: bool,
    pub max_age_secs: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub jwt: JwtManager,
    pub cookie: CookieConfig,
}

impl FromRef<AppState> for JwtManager {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

/// Wires the session service from configuration and store handles.
/// Spawns the email worker, so it must run inside a tokio runtime.
pub fn build_state(config: &Config, stores: &Stores) -> Result<AppState> {
    let hasher = PasswordHasher::with_params(
        config.argon2.memory_kib,
        config.argon2.iterations,
        config.argon2.parallelism,
    )
    .context("invalid Argon2 settings")?;
    let jwt = JwtManager::new(&config.jwt_secret, config.access_token_ttl_minutes);
    let policy = RefreshPolicy::from_days(
        config.refresh_token_ttl_days,
        config.refresh_token_absolute_ttl_days,
    );

    let sender: Arc<dyn EmailSender> = match &config.email.webhook_url {
        Some(url) => Arc::new(WebhookEmailSender::new(
            url.clone(),
            config.email.sender_name.clone(),
            EMAIL_WEBHOOK_TIMEOUT,
        )?),
        None => Arc::new(LogEmailSender),
    };
    let (mailer, _worker) = EmailDispatcher::start(
        sender,
        EmailWorkerConfig {
            workers: config.email.workers,
            queue_capacity: config.email.queue_capacity,
            max_attempts: config.email.max_attempts,
            ..EmailWorkerConfig::default()
        },
    );

    let sessions = SessionService::new(stores, hasher, jwt.clone(), policy, config.otp_ttl, mailer);

    Ok(AppState {
        sessions: Arc::new(sessions),
        jwt,
        cookie: CookieConfig {
            path: config.cookie_path.clone(),
            secure: config.is_production(),
            max_age_secs: policy.sliding.num_seconds(),
        },
    })
}

/// CORS for the browser frontend. Credentials are allowed so the refresh
/// cookie is sent, which rules out wildcard origins.
pub fn cors_layer(frontend_url: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_url.trim_end_matches('/'))
        .with_context(|| format!("FRONTEND_URL is not a valid origin: {frontend_url}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(DEVICE_ID_HEADER),
        ]))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/verify", post(verify_email))
        .route("/resend-code", post(resend_code))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/internal/send-receipt", post(send_receipt))
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::otp::CodeVerifier;
    use crate::config::Argon2Settings;
    use crate::testing::{FaultyStore, StoreOp};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        stores: Stores,
        state: AppState,
    }

    fn test_app() -> TestApp {
        test_app_with(Stores::memory())
    }

    fn test_app_with(stores: Stores) -> TestApp {
        let config = Config {
            argon2: Argon2Settings {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..Config::default()
        };
        let state = build_state(&config, &stores).unwrap();
        let router = build_router(state.clone(), cors_layer(&config.frontend_url).unwrap());
        TestApp {
            router,
            stores,
            state,
        }
    }

    fn json_request(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> axum::response::Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        /// Registers, verifies and logs in; returns the login response.
        async fn signed_in(&self, email: &str) -> axum::response::Response {
            let register = self
                .send(json_request(
                    "/auth/register",
                    &json!({"username": "tester", "email": email, "password": "Password123"}),
                ))
                .await;
            assert_eq!(register.status(), StatusCode::CREATED);

            let code = self
                .stores
                .ephemeral
                .get(&CodeVerifier::storage_key(email))
                .await
                .unwrap()
                .unwrap();
            let verify = self
                .send(json_request("/auth/verify", &json!({"email": email, "code": code})))
                .await;
            assert_eq!(verify.status(), StatusCode::OK);

            self.send(json_request(
                "/auth/login",
                &json!({"email": email, "password": "Password123"}),
            ))
            .await
        }
    }

    fn cookie_value(response: &axum::response::Response) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie
            .split(';')
            .next()
            .and_then(|kv| kv.strip_prefix("refresh_token="))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app();
        let response = app
            .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_json_is_a_400() {
        let app = test_app();
        let response = app
            .send(
                Request::builder()
                    .uri("/auth/register")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn login_sets_cookie_and_keeps_refresh_token_out_of_the_body() {
        let app = test_app();
        let response = app.signed_in("cookie@x.com").await;
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Strict"));
        assert!(set_cookie.contains("Path=/auth"));
        let max_age: i64 = set_cookie
            .split("; ")
            .find_map(|attr| attr.strip_prefix("Max-Age="))
            .unwrap()
            .parse()
            .unwrap();
        assert!((2_419_190..=2_419_200).contains(&max_age));

        let body = body_json(response).await;
        assert_eq!(body["token_type"], "Bearer");
        assert!(body.get("refresh_token").is_none());
        assert_eq!(body["user"]["email"], "cookie@x.com");
    }

    #[tokio::test]
    async fn login_sets_no_cookie_when_the_session_write_fails() {
        let store = FaultyStore::new();
        let app = test_app_with(store.stores());
        store.fail(StoreOp::CreateToken);

        let response = app.signed_in("down@x.com").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_json(response).await["error"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn unverified_login_is_403() {
        let app = test_app();
        app.send(json_request(
            "/auth/register",
            &json!({"username": "u", "email": "unverified@x.com", "password": "Password123"}),
        ))
        .await;

        let response = app
            .send(json_request(
                "/auth/login",
                &json!({"email": "unverified@x.com", "password": "Password123"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn refresh_rotates_the_cookie() {
        let app = test_app();
        let login = app.signed_in("rotate@x.com").await;
        let first = cookie_value(&login);

        let response = app
            .send(
                Request::builder()
                    .uri("/auth/refresh")
                    .method("POST")
                    .header(header::COOKIE, format!("refresh_token={first}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_ne!(cookie_value(&response), first);
        assert!(body_json(response).await["access_token"].is_string());
    }

    #[tokio::test]
    async fn failed_refresh_clears_the_cookie() {
        let app = test_app();
        let response = app
            .send(
                Request::builder()
                    .uri("/auth/refresh")
                    .method("POST")
                    .header(header::COOKIE, "refresh_token=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn refresh_without_cookie_is_401() {
        let app = test_app();
        let response = app
            .send(
                Request::builder()
                    .uri("/auth/refresh")
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_revokes_the_presented_token() {
        let app = test_app();
        let login = app.signed_in("logout@x.com").await;
        let raw = cookie_value(&login);

        let logout = app
            .send(
                Request::builder()
                    .uri("/auth/logout")
                    .method("POST")
                    .header(header::COOKIE, format!("refresh_token={raw}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(logout.status(), StatusCode::OK);
        assert!(
            logout.headers()[header::SET_COOKIE]
                .to_str()
                .unwrap()
                .contains("Max-Age=0")
        );

        let replay = app
            .send(
                Request::builder()
                    .uri("/auth/refresh")
                    .method("POST")
                    .header(header::COOKIE, format!("refresh_token={raw}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_all_requires_a_bearer_token() {
        let app = test_app();
        let response = app
            .send(
                Request::builder()
                    .uri("/auth/logout-all")
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_all_counts_revoked_sessions() {
        let app = test_app();
        let login = app.signed_in("all@x.com").await;
        let token = body_json(login).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .send(
                Request::builder()
                    .uri("/auth/logout-all")
                    .method("POST")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["revoked_sessions"], 1);
    }

    #[tokio::test]
    async fn cors_preflight_allows_frontend_with_credentials() {
        let app = test_app();
        let response = app
            .send(
                Request::builder()
                    .uri("/auth/login")
                    .method("OPTIONS")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-device-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn access_token_subject_matches_the_user() {
        let app = test_app();
        let login = app.signed_in("claims@x.com").await;
        let body = body_json(login).await;

        let claims = app
            .state
            .jwt
            .verify_token(body["access_token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.sub.to_string(), body["user"]["id"].as_str().unwrap());
        assert_eq!(claims.name, "tester");
    }
}
