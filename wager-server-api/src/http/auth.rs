use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use wager_server_domain::user::{Registration, Session};

use crate::{
    ApiError,
    auth::Auth,
    http::{ApiState, extract::Payload, json::JsonUser},
};

#[derive(Serialize)]
pub struct JsonSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub token: String,
    pub user: JsonUser,
}

impl JsonSession {
    fn new(message: Option<&'static str>, session: Session) -> Self {
        Self {
            message,
            token: session.token,
            user: session.user.into(),
        }
    }
}

#[derive(Serialize)]
pub struct JsonProfile {
    pub user: JsonUser,
}

#[derive(Deserialize)]
pub struct JsonLogin {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonInitData {
    pub init_data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonTelegramUser {
    #[serde(flatten)]
    pub user: JsonUser,
    pub is_new_user: bool,
}

#[derive(Serialize)]
pub struct JsonTelegramSession {
    pub token: String,
    pub user: JsonTelegramUser,
}

pub async fn register(
    State(state): State<ApiState>,
    Payload(registration): Payload<Registration>,
) -> Result<(StatusCode, Json<JsonSession>), ApiError> {
    let session = state.app.user_service.register(registration).await?;
    Ok((
        StatusCode::CREATED,
        Json(JsonSession::new(Some("User registered successfully"), session)),
    ))
}

pub async fn login(
    State(state): State<ApiState>,
    Payload(login): Payload<JsonLogin>,
) -> Result<Json<JsonSession>, ApiError> {
    let session = state
        .app
        .user_service
        .login(&login.email, &login.password)
        .await?;
    Ok(Json(JsonSession::new(Some("Login successful"), session)))
}

pub async fn profile(Auth(user): Auth) -> Json<JsonProfile> {
    Json(JsonProfile { user: user.into() })
}

pub async fn telegram_login(
    State(state): State<ApiState>,
    Payload(payload): Payload<JsonInitData>,
) -> Result<(StatusCode, Json<JsonTelegramSession>), ApiError> {
    let login = state.app.telegram_service.login(&payload.init_data).await?;
    let status = if login.is_new_user {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(JsonTelegramSession {
            token: login.session.token,
            user: JsonTelegramUser {
                user: login.session.user.into(),
                is_new_user: login.is_new_user,
            },
        }),
    ))
}

pub async fn telegram_link(
    Auth(user): Auth,
    State(state): State<ApiState>,
    Payload(payload): Payload<JsonInitData>,
) -> Result<Json<JsonSession>, ApiError> {
    let session = state
        .app
        .telegram_service
        .link(user.id, &payload.init_data)
        .await?;
    Ok(Json(JsonSession::new(None, session)))
}
