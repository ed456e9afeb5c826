use std::{fmt::Display, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use uuid::Uuid;
use wager_core::Achievement;
use wager_server_domain::{ServiceError, ServiceResult, app::Repositories};

use crate::{
    games::SqliteGameRepository, leaderboard::SqliteLeaderboardRepository,
    transactions::SqliteTransactionRepository, users::SqliteUserRepository,
};

pub mod games;
pub mod leaderboard;
pub mod transactions;
pub mod users;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    status TEXT NOT NULL,
    balance REAL NOT NULL DEFAULT 0,
    telegram_id INTEGER UNIQUE,
    achievements TEXT NOT NULL DEFAULT '',
    last_active INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    min_bet REAL NOT NULL,
    max_bet REAL NOT NULL,
    kind TEXT NOT NULL,
    house_edge REAL NOT NULL,
    payout_multiplier REAL NOT NULL,
    status TEXT NOT NULL,
    total_bets INTEGER NOT NULL DEFAULT 0,
    total_wagered REAL NOT NULL DEFAULT 0,
    total_payout REAL NOT NULL DEFAULT 0,
    last_played INTEGER,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount REAL NOT NULL,
    description TEXT,
    status TEXT NOT NULL,
    game_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    started_at INTEGER,
    completed_at INTEGER,
    error TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS transactions_user_created ON transactions (user_id, created_at);
CREATE INDEX IF NOT EXISTS transactions_created ON transactions (created_at);
CREATE TABLE IF NOT EXISTS leaderboard_entries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    username TEXT NOT NULL,
    period TEXT NOT NULL,
    period_start INTEGER NOT NULL,
    period_end INTEGER NOT NULL,
    score REAL NOT NULL DEFAULT 0,
    games_played INTEGER NOT NULL DEFAULT 0,
    total_wagered REAL NOT NULL DEFAULT 0,
    total_won REAL NOT NULL DEFAULT 0,
    achievements TEXT NOT NULL DEFAULT '',
    last_active INTEGER NOT NULL,
    UNIQUE (user_id, period, period_start)
);
CREATE INDEX IF NOT EXISTS leaderboard_window_score ON leaderboard_entries (period, period_start, score);
"#;

/// Opens (and creates if needed) the database file and makes sure the tables exist.
pub async fn open_pool(db_path: &str) -> ServiceResult<Pool<Sqlite>> {
    let conn_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(conn_options)
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    ensure_schema(&pool).await?;
    log::info!("Opened SQLite database at {}", db_path);
    Ok(pool)
}

pub async fn ensure_schema(pool: &Pool<Sqlite>) -> ServiceResult<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    Ok(())
}

pub fn sqlite_repositories(pool: Pool<Sqlite>) -> Repositories {
    Repositories {
        users: Arc::new(Box::new(SqliteUserRepository::new(pool.clone()))),
        games: Arc::new(Box::new(SqliteGameRepository::new(pool.clone()))),
        transactions: Arc::new(Box::new(SqliteTransactionRepository::new(pool.clone()))),
        leaderboard: Arc::new(Box::new(SqliteLeaderboardRepository::new(pool))),
    }
}

fn internal(e: sqlx::Error) -> ServiceError {
    ServiceError::Internal(e.to_string())
}

/// Maps unique constraint violations to `Conflict`, the message picked by the violated column.
fn conflict_or_internal(e: sqlx::Error, messages: &[(&str, &str)]) -> ServiceError {
    if let Some(db_error) = e.as_database_error()
        && db_error.is_unique_violation()
    {
        let text = db_error.message();
        let message = messages
            .iter()
            .find(|(column, _)| text.contains(column))
            .map(|(_, message)| *message)
            .unwrap_or("Already exists");
        return ServiceError::Conflict(message.to_string());
    }
    internal(e)
}

fn decode_error(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_millis(millis: i64) -> sqlx::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| decode_error(format!("Invalid timestamp {}", millis)))
}

fn parse_uuid(value: &str) -> sqlx::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| decode_error(format!("Invalid id {}: {}", value, e)))
}

fn parse_column<T>(value: &str) -> sqlx::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| decode_error(e.to_string()))
}

fn encode_achievements(achievements: &[Achievement]) -> String {
    achievements
        .iter()
        .map(Achievement::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_achievements(value: &str) -> sqlx::Result<Vec<Achievement>> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(parse_column)
        .collect()
}

#[cfg(test)]
pub(crate) async fn test_pool() -> Pool<Sqlite> {
    let conn_options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    // every connection to :memory: is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(conn_options)
        .await
        .unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}
