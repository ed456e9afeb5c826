use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A client for the wager HTTP API that keeps the logged in session around.
#[derive(Clone)]
pub struct WagerClient {
    api_url: String,
    http_client: reqwest::Client,
    session: Arc<RwLock<Option<Session>>>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub user: ClientUser,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("Failed to serialize/deserialize message")]
    Serde(#[from] serde_json::Error),

    #[error("Server responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not logged in")]
    NotLoggedIn,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: String,
    pub status: String,
    pub balance: f64,
    pub telegram_id: Option<i64>,
    #[serde(default)]
    pub achievements: Vec<String>,
}

impl ClientUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientGame {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub min_bet: f64,
    pub max_bet: f64,
    pub kind: String,
    pub house_edge: f64,
    pub payout_multiplier: f64,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGame {
    pub name: String,
    pub description: String,
    pub min_bet: f64,
    pub max_bet: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_edge: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ClientOutcome {
    pub won: bool,
    pub multiplier: f64,
    pub payout: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetReceipt {
    pub game_id: Uuid,
    pub bet: f64,
    pub outcome: ClientOutcome,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTransaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub status: String,
    pub description: Option<String>,
    pub game_id: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ClientPagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<ClientTransaction>,
    pub pagination: ClientPagination,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientLeaderboardEntry {
    pub rank: u64,
    pub user_id: Uuid,
    pub username: String,
    pub score: f64,
    pub games_played: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<ClientLeaderboardEntry>,
    pub pagination: ClientPagination,
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
    user: ClientUser,
}

#[derive(Deserialize)]
struct ProfileResponse {
    user: ClientUser,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

#[derive(Deserialize)]
struct FieldError {
    field: String,
    message: String,
}

/// Turns an error response body into a readable message.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        Ok(ErrorBody { errors, .. }) if !errors.is_empty() => errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join(", "),
        _ => body.to_string(),
    }
}

impl WagerClient {
    /// `api_url` is the versioned base, e.g. `http://localhost:3000/api/v1`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn logout(&self) {
        *self.session.write().await = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn token(&self) -> Result<String, ClientError> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.token.clone())
            .ok_or(ClientError::NotLoggedIn)
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, ClientError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, ClientError> {
        let token = self.token().await?;
        let request = self
            .http_client
            .get(self.url(path))
            .query(query)
            .bearer_auth(token);
        self.send(request).await
    }

    async fn post<R: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<R, ClientError> {
        let token = self.token().await?;
        let request = self
            .http_client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body);
        self.send(request).await
    }

    async fn start_session(&self, path: &str, body: Value) -> Result<ClientUser, ClientError> {
        let request = self.http_client.post(self.url(path)).json(&body);
        let resp: SessionResponse = self.send(request).await?;
        *self.session.write().await = Some(Session {
            token: resp.token,
            user: resp.user.clone(),
        });
        Ok(resp.user)
    }

    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<ClientUser, ClientError> {
        let body = json!({ "email": email, "username": username, "password": password });
        self.start_session("/auth/register", body).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<ClientUser, ClientError> {
        let body = json!({ "email": email, "password": password });
        self.start_session("/auth/login", body).await
    }

    pub async fn telegram_login(&self, init_data: &str) -> Result<ClientUser, ClientError> {
        self.start_session("/auth/telegram-login", json!({ "initData": init_data }))
            .await
    }

    /// Reloads the user snapshot held by the session.
    pub async fn refresh_profile(&self) -> Result<ClientUser, ClientError> {
        let profile: ProfileResponse = self.get("/auth/profile", &[]).await?;
        if let Some(session) = self.session.write().await.as_mut() {
            session.user = profile.user.clone();
        }
        Ok(profile.user)
    }

    pub async fn games(&self) -> Result<Vec<ClientGame>, ClientError> {
        let request = self.http_client.get(self.url("/games"));
        self.send(request).await
    }

    pub async fn create_game(&self, game: &NewGame) -> Result<ClientGame, ClientError> {
        self.post("/games", &serde_json::to_value(game)?).await
    }

    pub async fn place_bet(&self, game_id: Uuid, amount: f64) -> Result<BetReceipt, ClientError> {
        let receipt = self
            .post(&format!("/games/{}/bet", game_id), &json!({ "amount": amount }))
            .await?;
        self.refresh_profile().await?;
        Ok(receipt)
    }

    async fn create_transaction(
        &self,
        kind: &str,
        amount: f64,
    ) -> Result<ClientTransaction, ClientError> {
        let transaction = self
            .post("/transactions", &json!({ "type": kind, "amount": amount }))
            .await?;
        self.refresh_profile().await?;
        Ok(transaction)
    }

    pub async fn deposit(&self, amount: f64) -> Result<ClientTransaction, ClientError> {
        self.create_transaction("deposit", amount).await
    }

    pub async fn withdraw(&self, amount: f64) -> Result<ClientTransaction, ClientError> {
        self.create_transaction("withdrawal", amount).await
    }

    pub async fn my_transactions(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<TransactionPage, ClientError> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        self.get("/transactions/my", &query).await
    }

    pub async fn leaderboard(
        &self,
        period: &str,
        page: u32,
        limit: u32,
    ) -> Result<Leaderboard, ClientError> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        self.get(&format!("/leaderboard/{}", period), &query).await
    }

    pub async fn update_score(&self, score: f64) -> Result<Value, ClientError> {
        self.post("/leaderboard/update-score", &json!({ "score": score }))
            .await
    }

    /// Credits or debits another user's balance; requires an admin session.
    pub async fn admin_balance(
        &self,
        user_id: Uuid,
        kind: &str,
        amount: f64,
        description: &str,
    ) -> Result<ClientTransaction, ClientError> {
        #[derive(Deserialize)]
        struct BalanceResponse {
            transaction: ClientTransaction,
        }

        let body = json!({ "type": kind, "amount": amount, "description": description });
        let resp: BalanceResponse = self
            .post(&format!("/admin/users/{}/balance", user_id), &body)
            .await?;
        Ok(resp.transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":"Insufficient balance"}"#),
            "Insufficient balance"
        );
        assert_eq!(
            error_message(
                r#"{"errors":[{"field":"email","message":"Invalid email"},{"field":"password","message":"Too short"}]}"#
            ),
            "email: Invalid email, password: Too short"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = WagerClient::new("http://localhost:3000/api/v1/");
        assert_eq!(
            client.url("/games"),
            "http://localhost:3000/api/v1/games"
        );
    }

    #[tokio::test]
    async fn test_requires_session() {
        let client = WagerClient::new("http://localhost:1/api/v1");
        assert!(!client.is_logged_in().await);
        let result = client.refresh_profile().await;
        assert!(matches!(result, Err(ClientError::NotLoggedIn)));
    }

    #[test]
    fn test_user_snapshot_ignores_extra_fields() {
        let user: ClientUser = serde_json::from_str(
            r#"{"id":"7f1d2f2e-4a2b-4c6e-9c61-0d1b8e3f6a10","email":"a@b.c","username":"ann",
                "role":"admin","status":"active","balance":12.5,"telegramId":null,
                "achievements":["star"],"lastActive":"2026-01-01T00:00:00Z","isNewUser":true}"#,
        )
        .unwrap();
        assert!(user.is_admin());
        assert_eq!(user.achievements, vec!["star".to_string()]);
    }
}
