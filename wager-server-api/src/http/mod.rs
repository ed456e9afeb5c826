use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderValue, Method, header},
    middleware::{Next, from_fn, from_fn_with_state},
    response::Response,
    routing::{get, patch, post},
};
use log::info;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use wager_server_domain::{ServiceError, app::AppState};

use crate::{ApiError, error::attach_error_detail};

mod admin;
mod auth;
mod extract;
mod games;
mod json;
mod leaderboard;
mod transactions;

#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    /// Adds debug detail to error bodies.
    pub development: bool,
    /// Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            development: false,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub app: AppState,
    pub settings: Arc<ApiSettings>,
}

pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/profile", get(auth::profile))
        .route("/auth/telegram-login", post(auth::telegram_login))
        .route("/auth/telegram-link", post(auth::telegram_link))
        .route("/games", get(games::list).post(games::create))
        .route(
            "/games/{id}",
            get(games::get_by_id)
                .put(games::update)
                .patch(games::update)
                .delete(games::disable),
        )
        .route("/games/{id}/bet", post(games::place_bet))
        .route("/games/{id}/statistics", get(games::statistics))
        .route("/games/statistics/overall", get(games::overall_statistics))
        .route(
            "/transactions",
            get(transactions::list_all).post(transactions::create),
        )
        .route("/transactions/my", get(transactions::list_own))
        .route("/transactions/statistics", get(transactions::statistics))
        .route("/transactions/{id}", patch(transactions::update_status))
        .route("/leaderboard/update-score", post(leaderboard::update_score))
        .route("/leaderboard/user/{user_id}", get(leaderboard::user_positions))
        .route("/leaderboard/{period}", get(leaderboard::get_leaderboard))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/status", patch(admin::set_status))
        .route("/admin/users/{id}/balance", post(admin::balance_operation))
        .route(
            "/admin/users/{id}/transactions",
            get(admin::user_transactions),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), attach_error_detail))
        .layer(from_fn(log_request))
        .layer(cors_layer(&state.settings.cors_origins))
        .with_state(state)
}

pub async fn run(
    state: ApiState,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let address = format!("{}:{}", state.settings.host, state.settings.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("API server listening on {}", address);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("HTTP API shut down gracefully");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    log::debug!(
        "{} {} -> {} ({:?})",
        method,
        path,
        response.status(),
        started.elapsed()
    );
    response
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ServiceError::NotFound("Not found".to_string()).into()
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::StatusCode,
    };
    use tower::ServiceExt;
    use wager_core::OutcomeStrategies;
    use wager_server_domain::{
        app::{AppSettings, Repositories, construct_app},
        game::RandomSource,
        user::{UserFilter, UserRepository},
    };

    use super::*;
    use crate::JwtServiceImpl;

    struct FixedDraw(f64);

    impl RandomSource for FixedDraw {
        fn draw(&self) -> f64 {
            self.0
        }
    }

    fn test_router(development: bool) -> (Router, Repositories) {
        test_router_with(development, AppSettings::default())
    }

    fn test_router_with(development: bool, app_settings: AppSettings) -> (Router, Repositories) {
        let repositories = Repositories::in_memory();
        let app = construct_app(
            repositories.clone(),
            Arc::new(Box::new(JwtServiceImpl::new(b"test-secret"))),
            Arc::new(Box::new(FixedDraw(0.5))),
            OutcomeStrategies::default(),
            app_settings,
        );
        let settings = ApiSettings {
            development,
            ..Default::default()
        };
        let state = ApiState {
            app,
            settings: Arc::new(settings),
        };
        (router(state), repositories)
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(body) => Body::from(serde_json::to_vec(&body).unwrap()),
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(router: &Router, name: &str, role: &str) -> (String, String) {
        let (status, body) = send(
            router,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "email": format!("{}@example.com", name),
                "password": "secret123",
                "username": name,
                "role": role,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = test_router(false);
        let (status, body) = send(&router, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_register_and_duplicate_email() {
        let (router, repositories) = test_router(false);
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "Ann@Example.com", "password": "secret123", "username": "ann" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User registered successfully");
        assert_eq!(body["user"]["email"], "ann@example.com");
        assert_eq!(body["user"]["role"], "user");
        assert!(body["user"].get("passwordHash").is_none());

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "ann@example.com", "password": "secret123", "username": "other" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Email already registered");

        let users = repositories
            .users
            .get_users(&UserFilter::default())
            .await
            .unwrap();
        assert_eq!(users.total, 1);
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let (router, _) = test_router(false);
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "not-an-email", "password": "secret123", "username": "ann" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "email");

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "email": "ann@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_login_and_profile() {
        let (router, _) = test_router(false);
        register(&router, "ann", "user").await;

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ann@example.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ann@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) =
            send(&router, Method::GET, "/api/v1/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "ann");
    }

    #[tokio::test]
    async fn test_authentication_errors() {
        let (router, _) = test_router(false);
        let (status, body) = send(&router, Method::GET, "/api/v1/auth/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No token provided");

        let (status, body) =
            send(&router, Method::GET, "/api/v1/auth/profile", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");

        let (token, _) = register(&router, "ann", "user").await;
        let (status, body) =
            send(&router, Method::GET, "/api/v1/admin/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Admin access required");
    }

    #[tokio::test]
    async fn test_telegram_login_rejects_unverified_payload() {
        let mut app_settings = AppSettings::default();
        app_settings.telegram.bot_token = Some("12345:bot-token".to_string());
        let (router, repositories) = test_router_with(false, app_settings);

        let unsigned = r#"auth_date=1700000000&user={"id":7,"first_name":"Ann"}"#;
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/telegram-login",
            None,
            Some(json!({ "initData": unsigned })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing Telegram signature");

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/auth/telegram-login",
            None,
            Some(json!({ "initData": format!("{}&hash=00ff", unsigned) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid Telegram signature");
        assert!(
            repositories
                .users
                .get_user_by_telegram_id(7)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_is_rejected() {
        let (router, _) = test_router(false);
        let (admin, _) = register(&router, "boss", "admin").await;
        let (_, user_id) = register(&router, "ann", "user").await;
        let uri = format!("/api/v1/admin/users/{}/balance", user_id);

        let (status, body) = send(
            &router,
            Method::POST,
            &uri,
            Some(&admin),
            Some(json!({ "type": "credit", "amount": 1000.0, "description": "welcome" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["balance"], 1000.0);
        assert_eq!(body["transaction"]["status"], "completed");

        let (status, body) = send(
            &router,
            Method::POST,
            &uri,
            Some(&admin),
            Some(json!({ "type": "debit", "amount": 1500.0, "description": "fine" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Insufficient balance");

        let (status, body) = send(
            &router,
            Method::GET,
            "/api/v1/admin/users?search=ann",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"][0]["balance"], 1000.0);
        assert_eq!(body["pagination"]["total"], 1);

        let (status, body) = send(
            &router,
            Method::POST,
            &uri,
            Some(&admin),
            Some(json!({ "type": "deposit", "amount": 5.0, "description": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "type");
    }

    #[tokio::test]
    async fn test_bet_on_zero_edge_game_pays_out() {
        let (router, _) = test_router(false);
        let (admin, _) = register(&router, "boss", "admin").await;
        let (token, user_id) = register(&router, "ann", "user").await;

        let (status, game) = send(
            &router,
            Method::POST,
            "/api/v1/games",
            Some(&admin),
            Some(json!({
                "name": "Coin",
                "description": "Flip a coin",
                "minBet": 10.0,
                "maxBet": 100.0,
                "houseEdge": 0.0,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", game);
        let game_id = game["id"].as_str().unwrap().to_string();

        send(
            &router,
            Method::POST,
            &format!("/api/v1/admin/users/{}/balance", user_id),
            Some(&admin),
            Some(json!({ "type": "credit", "amount": 100.0, "description": "stake" })),
        )
        .await;

        let (status, body) = send(
            &router,
            Method::POST,
            &format!("/api/v1/games/{}/bet", game_id),
            Some(&token),
            Some(json!({ "amount": 50.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["gameId"], game_id.as_str());
        assert_eq!(body["bet"], 50.0);
        assert_eq!(body["outcome"]["won"], true);
        assert_eq!(body["outcome"]["payout"], 100.0);

        let (_, stats) = send(
            &router,
            Method::GET,
            &format!("/api/v1/games/{}/statistics", game_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(stats["statistics"]["totalBets"], 1);
        assert_eq!(stats["statistics"]["totalWagered"], 50.0);

        let (_, mine) = send(
            &router,
            Method::GET,
            "/api/v1/transactions/my?type=win",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(mine["transactions"][0]["amount"], 100.0);
        assert_eq!(mine["transactions"][0]["gameId"], game_id.as_str());

        let (status, body) = send(
            &router,
            Method::POST,
            &format!("/api/v1/games/{}/bet", game_id),
            Some(&token),
            Some(json!({ "amount": 500.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bet amount must be between 10 and 100");
    }

    #[tokio::test]
    async fn test_leaderboard_routes() {
        let (router, _) = test_router(false);
        let (token, user_id) = register(&router, "ann", "user").await;

        let (status, body) = send(
            &router,
            Method::GET,
            "/api/v1/leaderboard/yearly",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid period");

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/leaderboard/update-score",
            Some(&token),
            Some(json!({ "score": 42.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updates"].as_array().unwrap().len(), 3);

        let (_, body) = send(
            &router,
            Method::GET,
            "/api/v1/leaderboard/weekly",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["entries"][0]["rank"], 1);
        assert_eq!(body["entries"][0]["score"], 42.0);

        let (_, body) = send(
            &router,
            Method::GET,
            &format!("/api/v1/leaderboard/user/{}", user_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["positions"][0]["rank"], 1);
    }

    #[tokio::test]
    async fn test_development_mode_adds_detail() {
        let (router, _) = test_router(true);
        let (status, body) = send(&router, Method::GET, "/api/v1/auth/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No token provided");
        assert!(body["detail"].is_string());

        let (router, _) = test_router(false);
        let (_, body) = send(&router, Method::GET, "/api/v1/auth/profile", None, None).await;
        assert!(body.get("detail").is_none());
    }
}
