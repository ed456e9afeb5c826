use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use wager_core::OddsConfig;
use wager_server_domain::{
    ServiceError, ServiceResult,
    game::{Game, GameFilter, GameId, GameRepository, GameStatistics},
};

use crate::{conflict_or_internal, from_millis, internal, parse_column, parse_uuid, to_millis};

const UNIQUE_MESSAGES: &[(&str, &str)] = &[("games.name", "Game with this name already exists")];

pub struct SqliteGameRepository {
    pool: Pool<Sqlite>,
}

impl SqliteGameRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn game_from_row(row: &SqliteRow) -> sqlx::Result<Game> {
        let last_played: Option<i64> = row.try_get("last_played")?;
        let total_bets: i64 = row.try_get("total_bets")?;
        Ok(Game {
            id: parse_uuid(row.try_get("id")?)?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            min_bet: row.try_get("min_bet")?,
            max_bet: row.try_get("max_bet")?,
            kind: parse_column(row.try_get("kind")?)?,
            odds: OddsConfig {
                house_edge: row.try_get("house_edge")?,
                payout_multiplier: row.try_get("payout_multiplier")?,
            },
            status: parse_column(row.try_get("status")?)?,
            statistics: GameStatistics {
                total_bets: total_bets as u64,
                total_wagered: row.try_get("total_wagered")?,
                total_payout: row.try_get("total_payout")?,
            },
            last_played: last_played.map(from_millis).transpose()?,
            created_at: from_millis(row.try_get("created_at")?)?,
        })
    }
}

#[async_trait::async_trait]
impl GameRepository for SqliteGameRepository {
    async fn get_game(&self, id: GameId) -> ServiceResult<Option<Game>> {
        let row = sqlx::query("SELECT * FROM games WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref()
            .map(Self::game_from_row)
            .transpose()
            .map_err(internal)
    }

    async fn get_game_by_name(&self, name: &str) -> ServiceResult<Option<Game>> {
        let row = sqlx::query("SELECT * FROM games WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref()
            .map(Self::game_from_row)
            .transpose()
            .map_err(internal)
    }

    async fn create_game(&self, game: &Game) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO games (id, name, description, min_bet, max_bet, kind, house_edge, \
             payout_multiplier, status, total_bets, total_wagered, total_payout, last_played, \
             created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(game.id.to_string())
        .bind(&game.name)
        .bind(&game.description)
        .bind(game.min_bet)
        .bind(game.max_bet)
        .bind(game.kind.as_str())
        .bind(game.odds.house_edge)
        .bind(game.odds.payout_multiplier)
        .bind(game.status.as_str())
        .bind(game.statistics.total_bets as i64)
        .bind(game.statistics.total_wagered)
        .bind(game.statistics.total_payout)
        .bind(game.last_played.map(to_millis))
        .bind(to_millis(game.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_internal(e, UNIQUE_MESSAGES))?;
        Ok(())
    }

    async fn update_game(&self, game: &Game) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE games SET name = ?, description = ?, min_bet = ?, max_bet = ?, kind = ?, \
             house_edge = ?, payout_multiplier = ?, status = ? WHERE id = ?",
        )
        .bind(&game.name)
        .bind(&game.description)
        .bind(game.min_bet)
        .bind(game.max_bet)
        .bind(game.kind.as_str())
        .bind(game.odds.house_edge)
        .bind(game.odds.payout_multiplier)
        .bind(game.status.as_str())
        .bind(game.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_internal(e, UNIQUE_MESSAGES))?;
        if result.rows_affected() == 0 {
            return ServiceError::not_found("Game not found");
        }
        Ok(())
    }

    async fn record_bet(
        &self,
        id: GameId,
        wagered: f64,
        payout: f64,
        played_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE games SET total_bets = total_bets + 1, total_wagered = total_wagered + ?, \
             total_payout = total_payout + ?, last_played = ? WHERE id = ?",
        )
        .bind(wagered)
        .bind(payout)
        .bind(to_millis(played_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return ServiceError::not_found("Game not found");
        }
        Ok(())
    }

    async fn get_games(&self, filter: &GameFilter) -> ServiceResult<Vec<Game>> {
        let where_clause = if filter.status.is_some() {
            " WHERE status = ?"
        } else {
            ""
        };
        let query_str = format!(
            "SELECT * FROM games{} ORDER BY last_played IS NULL, last_played DESC, created_at DESC",
            where_clause
        );
        let mut query = sqlx::query(&query_str);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(internal)?;
        rows.iter()
            .map(Self::game_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(internal)
    }
}
