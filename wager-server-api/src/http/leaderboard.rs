use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wager_core::Period;
use wager_server_domain::{ServiceError, leaderboard::LeaderboardEntry, util::Pagination};

use crate::{
    ApiError,
    auth::Auth,
    http::{
        ApiState,
        extract::{Params, Payload},
        json::{JsonLeaderboardEntry, JsonPagination, JsonPosition},
    },
};

const DEFAULT_LIMIT: u32 = 10;

#[derive(Deserialize)]
pub struct JsonPageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct JsonLeaderboard {
    pub entries: Vec<JsonLeaderboardEntry>,
    pub pagination: JsonPagination,
}

#[derive(Serialize)]
pub struct JsonPositions {
    pub positions: Vec<JsonPosition>,
}

#[derive(Deserialize)]
pub struct JsonScore {
    pub score: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonScoreUpdate {
    pub period: &'static str,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub score: f64,
    pub games_played: u64,
}

impl From<LeaderboardEntry> for JsonScoreUpdate {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            period: entry.period.as_str(),
            period_start: entry.window.start,
            period_end: entry.window.end,
            score: entry.standing.score,
            games_played: entry.standing.games_played,
        }
    }
}

#[derive(Serialize)]
pub struct JsonScoreUpdates {
    pub updates: Vec<JsonScoreUpdate>,
}

pub async fn get_leaderboard(
    Auth(_): Auth,
    State(state): State<ApiState>,
    Path(period): Path<String>,
    Params(query): Params<JsonPageQuery>,
) -> Result<Json<JsonLeaderboard>, ApiError> {
    let period: Period = period
        .parse()
        .map_err(|_| ServiceError::BadRequest("Invalid period".to_string()))?;
    let pagination = Pagination::new(query.page, query.limit, DEFAULT_LIMIT);
    let page = state
        .app
        .leaderboard_service
        .get_leaderboard(period, pagination)
        .await?;
    let pagination = JsonPagination::from(&page);
    Ok(Json(JsonLeaderboard {
        entries: page
            .items
            .into_iter()
            .map(JsonLeaderboardEntry::from)
            .collect(),
        pagination,
    }))
}

pub async fn user_positions(
    Auth(_): Auth,
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<JsonPositions>, ApiError> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| ServiceError::NotFound("User not found".to_string()))?;
    let positions = state.app.leaderboard_service.user_positions(user_id).await?;
    Ok(Json(JsonPositions {
        positions: positions.into_iter().map(JsonPosition::from).collect(),
    }))
}

pub async fn update_score(
    Auth(user): Auth,
    State(state): State<ApiState>,
    Payload(payload): Payload<JsonScore>,
) -> Result<Json<JsonScoreUpdates>, ApiError> {
    let updates = state
        .app
        .leaderboard_service
        .submit_score(user.id, payload.score)
        .await?;
    Ok(Json(JsonScoreUpdates {
        updates: updates.into_iter().map(JsonScoreUpdate::from).collect(),
    }))
}
