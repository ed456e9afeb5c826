//! DashMap-backed repositories, used when no database is configured and in tests.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use wager_core::Period;

use crate::{
    ServiceError, ServiceResult,
    game::{Game, GameFilter, GameId, GameRepository},
    leaderboard::{LeaderboardEntry, LeaderboardRepository},
    ledger::{
        DateRange, KindTally, Transaction, TransactionFilter, TransactionId,
        TransactionRepository, TransactionStatus,
    },
    user::{User, UserFilter, UserId, UserRepository, UserUpdate},
    util::{Paginated, Pagination},
};

pub struct InMemoryUserRepository {
    users: DashMap<UserId, User>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    fn find(&self, predicate: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_user(&self, id: UserId) -> ServiceResult<Option<User>> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        Ok(self.find(|user| user.email == email))
    }

    async fn get_user_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        Ok(self.find(|user| user.username == username))
    }

    async fn get_user_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>> {
        Ok(self.find(|user| user.telegram_id == Some(telegram_id)))
    }

    async fn create_user(&self, user: &User) -> ServiceResult<()> {
        let taken = self.find(|other| {
            other.email == user.email
                || other.username == user.username
                || (user.telegram_id.is_some() && other.telegram_id == user.telegram_id)
        });
        if taken.is_some() || self.users.contains_key(&user.id) {
            return ServiceError::conflict("User already exists");
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> ServiceResult<()> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return ServiceError::not_found("User not found");
        };
        update.apply(&mut user);
        Ok(())
    }

    async fn compare_and_set_balance(
        &self,
        id: UserId,
        expected: f64,
        new: f64,
    ) -> ServiceResult<bool> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return ServiceError::not_found("User not found");
        };
        if user.balance != expected {
            return Ok(false);
        }
        user.balance = new;
        Ok(true)
    }

    async fn get_users(&self, filter: &UserFilter) -> ServiceResult<Paginated<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(filter.pagination.apply(users))
    }
}

pub struct InMemoryGameRepository {
    games: DashMap<GameId, Game>,
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        Self {
            games: DashMap::new(),
        }
    }

    fn name_taken(&self, name: &str, except: GameId) -> bool {
        self.games
            .iter()
            .any(|entry| entry.name == name && entry.id != except)
    }
}

#[async_trait::async_trait]
impl GameRepository for InMemoryGameRepository {
    async fn get_game(&self, id: GameId) -> ServiceResult<Option<Game>> {
        Ok(self.games.get(&id).map(|game| game.clone()))
    }

    async fn get_game_by_name(&self, name: &str) -> ServiceResult<Option<Game>> {
        Ok(self
            .games
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value().clone()))
    }

    async fn create_game(&self, game: &Game) -> ServiceResult<()> {
        if self.name_taken(&game.name, game.id) || self.games.contains_key(&game.id) {
            return ServiceError::conflict("Game with this name already exists");
        }
        self.games.insert(game.id, game.clone());
        Ok(())
    }

    async fn update_game(&self, game: &Game) -> ServiceResult<()> {
        if self.name_taken(&game.name, game.id) {
            return ServiceError::conflict("Game with this name already exists");
        }
        let Some(mut stored) = self.games.get_mut(&game.id) else {
            return ServiceError::not_found("Game not found");
        };
        let statistics = stored.statistics;
        let last_played = stored.last_played;
        *stored = Game {
            statistics,
            last_played,
            ..game.clone()
        };
        Ok(())
    }

    async fn record_bet(
        &self,
        id: GameId,
        wagered: f64,
        payout: f64,
        played_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let Some(mut game) = self.games.get_mut(&id) else {
            return ServiceError::not_found("Game not found");
        };
        game.statistics.total_bets += 1;
        game.statistics.total_wagered += wagered;
        game.statistics.total_payout += payout;
        game.last_played = Some(played_at);
        Ok(())
    }

    async fn get_games(&self, filter: &GameFilter) -> ServiceResult<Vec<Game>> {
        let mut games: Vec<Game> = self
            .games
            .iter()
            .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        games.sort_by(|a, b| {
            b.last_played
                .cmp(&a.last_played)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(games)
    }
}

pub struct InMemoryTransactionRepository {
    transactions: DashMap<TransactionId, Transaction>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn save_transaction(&self, transaction: &Transaction) -> ServiceResult<()> {
        self.transactions
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> ServiceResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> ServiceResult<Paginated<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(filter.pagination.apply(transactions))
    }

    async fn get_tallies(&self, range: &DateRange) -> ServiceResult<Vec<KindTally>> {
        let mut tallies: Vec<KindTally> = Vec::new();
        for entry in self.transactions.iter() {
            let transaction = entry.value();
            if !range.contains(transaction.created_at) {
                continue;
            }
            let index = match tallies.iter().position(|t| t.kind == transaction.kind) {
                Some(index) => index,
                None => {
                    tallies.push(KindTally {
                        kind: transaction.kind,
                        count: 0,
                        completed: 0,
                        total: 0.0,
                    });
                    tallies.len() - 1
                }
            };
            let tally = &mut tallies[index];
            tally.count += 1;
            tally.total += transaction.amount;
            if transaction.status == TransactionStatus::Completed {
                tally.completed += 1;
            }
        }
        Ok(tallies)
    }
}

type EntryKey = (UserId, Period, DateTime<Utc>);

pub struct InMemoryLeaderboardRepository {
    entries: DashMap<EntryKey, LeaderboardEntry>,
}

impl InMemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn window_entries(&self, period: Period, period_start: DateTime<Utc>) -> Vec<LeaderboardEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.period == period && entry.window.start == period_start)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl LeaderboardRepository for InMemoryLeaderboardRepository {
    async fn get_entry(
        &self,
        user_id: UserId,
        period: Period,
        period_start: DateTime<Utc>,
    ) -> ServiceResult<Option<LeaderboardEntry>> {
        Ok(self
            .entries
            .get(&(user_id, period, period_start))
            .map(|entry| entry.clone()))
    }

    async fn save_entry(&self, entry: &LeaderboardEntry) -> ServiceResult<()> {
        let key = (entry.user_id, entry.period, entry.window.start);
        match self.entries.get_mut(&key) {
            // the first stored id wins
            Some(mut stored) => {
                let id = stored.id;
                *stored = LeaderboardEntry {
                    id,
                    ..entry.clone()
                };
            }
            None => {
                self.entries.insert(key, entry.clone());
            }
        }
        Ok(())
    }

    async fn get_entries(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<LeaderboardEntry>> {
        let mut entries = self.window_entries(period, period_start);
        entries.sort_by(|a, b| {
            b.standing
                .score
                .partial_cmp(&a.standing.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.last_active.cmp(&b.last_active))
        });
        Ok(pagination.apply(entries))
    }

    async fn count_higher_scores(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        score: f64,
    ) -> ServiceResult<u64> {
        Ok(self
            .window_entries(period, period_start)
            .iter()
            .filter(|entry| entry.standing.score > score)
            .count() as u64)
    }

    async fn delete_entries_ending_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<u64> {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.window.end >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
