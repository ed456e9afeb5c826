use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;
use wager_core::{Achievement, BetOutcome};
use wager_server_domain::{
    game::{Game, GameStatistics, GameStatus},
    leaderboard::{Position, RankedEntry},
    ledger::{Transaction, TransactionKind, TransactionStatus},
    user::{Role, User, UserStatus},
    util::Paginated,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl<T> From<&Paginated<T>> for JsonPagination {
    fn from(page: &Paginated<T>) -> Self {
        Self {
            page: page.pagination.page,
            limit: page.pagination.limit,
            total: page.total,
            pages: page.pages(),
        }
    }
}

fn achievement_names(achievements: &[Achievement]) -> Vec<&'static str> {
    achievements.iter().map(Achievement::as_str).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub balance: f64,
    pub telegram_id: Option<i64>,
    pub achievements: Vec<&'static str>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for JsonUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            achievements: achievement_names(&user.achievements),
            email: user.email,
            username: user.username,
            role: user.role,
            status: user.status,
            balance: user.balance,
            telegram_id: user.telegram_id,
            last_active: user.last_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonProcessing {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub game_id: Option<Uuid>,
    pub metadata: Value,
    pub processing: JsonProcessing,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for JsonTransaction {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            user_id: transaction.user_id,
            kind: transaction.kind,
            amount: transaction.amount,
            description: transaction.description,
            status: transaction.status,
            game_id: transaction.game_id,
            metadata: transaction.metadata,
            processing: JsonProcessing {
                started_at: transaction.processing.started_at,
                completed_at: transaction.processing.completed_at,
                error: transaction.processing.error,
            },
            created_at: transaction.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonGame {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub min_bet: f64,
    pub max_bet: f64,
    pub kind: &'static str,
    pub house_edge: f64,
    pub payout_multiplier: f64,
    pub status: GameStatus,
    pub statistics: GameStatistics,
    pub last_played: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Game> for JsonGame {
    fn from(game: Game) -> Self {
        Self {
            id: game.id,
            name: game.name,
            description: game.description,
            min_bet: game.min_bet,
            max_bet: game.max_bet,
            kind: game.kind.as_str(),
            house_edge: game.odds.house_edge,
            payout_multiplier: game.odds.payout_multiplier,
            status: game.status,
            statistics: game.statistics,
            last_played: game.last_played,
            created_at: game.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonOutcome {
    pub won: bool,
    pub multiplier: f64,
    pub payout: f64,
}

impl From<BetOutcome> for JsonOutcome {
    fn from(outcome: BetOutcome) -> Self {
        Self {
            won: outcome.won,
            multiplier: outcome.multiplier,
            payout: outcome.payout,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonLeaderboardEntry {
    pub rank: u64,
    pub user_id: Uuid,
    pub username: String,
    pub period: &'static str,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub score: f64,
    pub games_played: u64,
    pub total_wagered: f64,
    pub total_won: f64,
    pub achievements: Vec<&'static str>,
    pub last_active: DateTime<Utc>,
}

impl From<RankedEntry> for JsonLeaderboardEntry {
    fn from(ranked: RankedEntry) -> Self {
        let entry = ranked.entry;
        Self {
            rank: ranked.rank,
            user_id: entry.user_id,
            username: entry.username,
            period: entry.period.as_str(),
            period_start: entry.window.start,
            period_end: entry.window.end,
            score: entry.standing.score,
            games_played: entry.standing.games_played,
            total_wagered: entry.standing.total_wagered,
            total_won: entry.standing.total_won,
            achievements: achievement_names(&entry.standing.achievements),
            last_active: entry.last_active,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPosition {
    pub period: &'static str,
    pub rank: Option<u64>,
    pub score: f64,
}

impl From<Position> for JsonPosition {
    fn from(position: Position) -> Self {
        Self {
            period: position.period.as_str(),
            rank: position.rank,
            score: position.score,
        }
    }
}
