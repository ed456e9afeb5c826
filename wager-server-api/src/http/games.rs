use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wager_server_domain::{
    ServiceError,
    game::{GameDraft, GameId, GamePatch, GameStatistics, OverallStatistics},
};

use crate::{
    ApiError,
    auth::{AdminAuth, Auth},
    http::{
        ApiState,
        extract::Payload,
        json::{JsonGame, JsonOutcome},
    },
};

#[derive(Deserialize)]
pub struct JsonBet {
    pub amount: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonBetReceipt {
    pub game_id: Uuid,
    pub bet: f64,
    pub outcome: JsonOutcome,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonGameStatistics {
    pub game_id: Uuid,
    pub name: String,
    pub statistics: GameStatistics,
    pub last_played: Option<DateTime<Utc>>,
}

fn parse_game_id(id: &str) -> Result<GameId, ApiError> {
    Uuid::parse_str(id).map_err(|_| ServiceError::NotFound("Game not found".to_string()).into())
}

pub async fn list(State(state): State<ApiState>) -> Result<Json<Vec<JsonGame>>, ApiError> {
    let games = state.app.game_service.list_active_games().await?;
    Ok(Json(games.into_iter().map(JsonGame::from).collect()))
}

pub async fn get_by_id(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JsonGame>, ApiError> {
    let game = state.app.game_service.get_game(parse_game_id(&id)?).await?;
    Ok(Json(game.into()))
}

pub async fn create(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Payload(draft): Payload<GameDraft>,
) -> Result<(StatusCode, Json<JsonGame>), ApiError> {
    let game = state.app.game_service.create_game(draft).await?;
    Ok((StatusCode::CREATED, Json(game.into())))
}

pub async fn update(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Payload(patch): Payload<GamePatch>,
) -> Result<Json<JsonGame>, ApiError> {
    let game = state
        .app
        .game_service
        .update_game(parse_game_id(&id)?, patch)
        .await?;
    Ok(Json(game.into()))
}

pub async fn disable(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JsonGame>, ApiError> {
    let game = state
        .app
        .game_service
        .disable_game(parse_game_id(&id)?)
        .await?;
    Ok(Json(game.into()))
}

pub async fn place_bet(
    Auth(user): Auth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Payload(bet): Payload<JsonBet>,
) -> Result<Json<JsonBetReceipt>, ApiError> {
    let receipt = state
        .app
        .game_service
        .place_bet(user.id, parse_game_id(&id)?, bet.amount)
        .await?;
    Ok(Json(JsonBetReceipt {
        game_id: receipt.game_id,
        bet: receipt.bet,
        outcome: receipt.outcome.into(),
    }))
}

pub async fn statistics(
    Auth(_): Auth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JsonGameStatistics>, ApiError> {
    let game = state.app.game_service.get_game(parse_game_id(&id)?).await?;
    Ok(Json(JsonGameStatistics {
        game_id: game.id,
        name: game.name,
        statistics: game.statistics,
        last_played: game.last_played,
    }))
}

pub async fn overall_statistics(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
) -> Result<Json<OverallStatistics>, ApiError> {
    Ok(Json(state.app.game_service.overall_statistics().await?))
}
