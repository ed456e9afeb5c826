use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local, Utc};
use dashmap::DashMap;
use log::{error, info};
use uuid::Uuid;
use wager_core::{GameResult, Period, PeriodWindow, Standing, period_window, retention_cutoff};

use crate::{
    ServiceError, ServiceResult,
    user::{ArcUserRepository, User, UserId, UserUpdate},
    util::{Paginated, Pagination},
};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
pub struct LeaderboardEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub username: String,
    pub period: Period,
    pub window: PeriodWindow,
    pub standing: Standing,
    pub last_active: DateTime<Utc>,
}

impl LeaderboardEntry {
    pub fn new(user: &User, period: Period, window: PeriodWindow) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            username: user.username.clone(),
            period,
            window,
            standing: Standing::default(),
            last_active: Utc::now(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RankedEntry {
    pub rank: u64,
    pub entry: LeaderboardEntry,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub period: Period,
    pub rank: Option<u64>,
    pub score: f64,
}

pub type ArcLeaderboardRepository = Arc<Box<dyn LeaderboardRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait LeaderboardRepository {
    async fn get_entry(
        &self,
        user_id: UserId,
        period: Period,
        period_start: DateTime<Utc>,
    ) -> ServiceResult<Option<LeaderboardEntry>>;
    /// Inserts or overwrites the entry of the same user, period and window start.
    async fn save_entry(&self, entry: &LeaderboardEntry) -> ServiceResult<()>;
    /// Highest score first.
    async fn get_entries(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<LeaderboardEntry>>;
    async fn count_higher_scores(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        score: f64,
    ) -> ServiceResult<u64>;
    async fn delete_entries_ending_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<u64>;
}

pub type ArcLeaderboardService = Arc<Box<dyn LeaderboardService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait LeaderboardService {
    /// The user's entry for the current window, not persisted if it is new.
    async fn get_or_create_entry(
        &self,
        user_id: UserId,
        period: Period,
    ) -> ServiceResult<LeaderboardEntry>;
    async fn record_game_result(
        &self,
        user_id: UserId,
        result: GameResult,
    ) -> ServiceResult<Vec<LeaderboardEntry>>;
    async fn get_leaderboard(
        &self,
        period: Period,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<RankedEntry>>;
    async fn user_positions(&self, user_id: UserId) -> ServiceResult<Vec<Position>>;
    async fn submit_score(
        &self,
        user_id: UserId,
        score: f64,
    ) -> ServiceResult<Vec<LeaderboardEntry>>;
    /// Drops entries of windows that ended more than three months ago.
    async fn cleanup(&self) -> ServiceResult<u64>;
}

pub struct LeaderboardServiceImpl {
    user_repository: ArcUserRepository,
    leaderboard_repository: ArcLeaderboardRepository,
    entry_locks: DashMap<(UserId, Period), Arc<tokio::sync::Mutex<()>>>,
}

impl LeaderboardServiceImpl {
    pub fn new(
        user_repository: ArcUserRepository,
        leaderboard_repository: ArcLeaderboardRepository,
    ) -> Self {
        Self {
            user_repository,
            leaderboard_repository,
            entry_locks: DashMap::new(),
        }
    }

    fn current_window(period: Period) -> PeriodWindow {
        period_window(period, &Local::now())
    }

    async fn fetch_user(&self, user_id: UserId) -> ServiceResult<User> {
        match self.user_repository.get_user(user_id).await? {
            Some(user) => Ok(user),
            None => ServiceError::not_found("User not found"),
        }
    }

    async fn entry_for(&self, user: &User, period: Period) -> ServiceResult<LeaderboardEntry> {
        let window = Self::current_window(period);
        let entry = self
            .leaderboard_repository
            .get_entry(user.id, period, window.start)
            .await?;
        Ok(entry.unwrap_or_else(|| LeaderboardEntry::new(user, period, window)))
    }

    fn entry_lock(&self, user_id: UserId, period: Period) -> Arc<tokio::sync::Mutex<()>> {
        self.entry_locks
            .entry((user_id, period))
            .or_default()
            .clone()
    }

    /// Read-modify-write of the user's current entry for every period.
    async fn update_entries(
        &self,
        user: &User,
        mut update: impl FnMut(&mut LeaderboardEntry) + Send,
    ) -> ServiceResult<Vec<LeaderboardEntry>> {
        let mut entries = Vec::with_capacity(Period::ALL.len());
        for period in Period::ALL {
            let lock = self.entry_lock(user.id, period);
            let _guard = lock.lock().await;
            let mut entry = self.entry_for(user, period).await?;
            update(&mut entry);
            entry.username = user.username.clone();
            entry.last_active = Utc::now();
            self.leaderboard_repository.save_entry(&entry).await?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl LeaderboardService for LeaderboardServiceImpl {
    async fn get_or_create_entry(
        &self,
        user_id: UserId,
        period: Period,
    ) -> ServiceResult<LeaderboardEntry> {
        let user = self.fetch_user(user_id).await?;
        self.entry_for(&user, period).await
    }

    async fn record_game_result(
        &self,
        user_id: UserId,
        result: GameResult,
    ) -> ServiceResult<Vec<LeaderboardEntry>> {
        let user = self.fetch_user(user_id).await?;
        let mut earned = Vec::new();
        let entries = self
            .update_entries(&user, |entry| earned.extend(entry.standing.apply(&result)))
            .await?;

        let mut achievements = user.achievements.clone();
        for achievement in earned {
            if !achievements.contains(&achievement) {
                achievements.push(achievement);
            }
        }
        if achievements != user.achievements {
            info!("User {} earned {:?}", user.id, achievements);
            let update = UserUpdate {
                achievements: Some(achievements),
                ..Default::default()
            };
            self.user_repository.update_user(user.id, &update).await?;
        }
        Ok(entries)
    }

    async fn get_leaderboard(
        &self,
        period: Period,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<RankedEntry>> {
        let window = Self::current_window(period);
        let page = self
            .leaderboard_repository
            .get_entries(period, window.start, pagination)
            .await?;
        let offset = pagination.offset() as u64;
        let mut position = 0;
        Ok(page.map(|entry| {
            position += 1;
            RankedEntry {
                rank: offset + position,
                entry,
            }
        }))
    }

    async fn user_positions(&self, user_id: UserId) -> ServiceResult<Vec<Position>> {
        let mut positions = Vec::with_capacity(Period::ALL.len());
        for period in Period::ALL {
            let window = Self::current_window(period);
            let entry = self
                .leaderboard_repository
                .get_entry(user_id, period, window.start)
                .await?;
            let position = match entry {
                Some(entry) => {
                    let higher = self
                        .leaderboard_repository
                        .count_higher_scores(period, window.start, entry.standing.score)
                        .await?;
                    Position {
                        period,
                        rank: Some(higher + 1),
                        score: entry.standing.score,
                    }
                }
                None => Position {
                    period,
                    rank: None,
                    score: 0.0,
                },
            };
            positions.push(position);
        }
        Ok(positions)
    }

    async fn submit_score(
        &self,
        user_id: UserId,
        score: f64,
    ) -> ServiceResult<Vec<LeaderboardEntry>> {
        if !score.is_finite() || score < 0.0 {
            return ServiceError::bad_request("Invalid score");
        }
        let user = self.fetch_user(user_id).await?;
        self.update_entries(&user, |entry| entry.standing.submit_score(score))
            .await
    }

    async fn cleanup(&self) -> ServiceResult<u64> {
        let cutoff = retention_cutoff(Utc::now());
        let removed = self
            .leaderboard_repository
            .delete_entries_ending_before(cutoff)
            .await?;
        // a lock nobody holds or waits on is recreated on demand
        self.entry_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(removed)
    }
}

pub struct LeaderboardCleanupJob {
    leaderboard_service: ArcLeaderboardService,
}

impl LeaderboardCleanupJob {
    pub fn new(leaderboard_service: ArcLeaderboardService) -> Self {
        Self {
            leaderboard_service,
        }
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match self.leaderboard_service.cleanup().await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} expired leaderboard entries", removed),
                Err(e) => error!("Failed to clean up leaderboard entries: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use wager_core::Achievement;

    use super::*;
    use crate::{
        memory::{InMemoryLeaderboardRepository, InMemoryUserRepository},
        user::{Role, UserRepository},
    };

    struct Fixture {
        service: LeaderboardServiceImpl,
        users: ArcUserRepository,
        entries: ArcLeaderboardRepository,
    }

    fn fixture() -> Fixture {
        let users: ArcUserRepository = Arc::new(Box::new(InMemoryUserRepository::new()));
        let entries: ArcLeaderboardRepository =
            Arc::new(Box::new(InMemoryLeaderboardRepository::new()));
        Fixture {
            service: LeaderboardServiceImpl::new(users.clone(), entries.clone()),
            users,
            entries,
        }
    }

    async fn user(f: &Fixture, name: &str) -> User {
        let user = User::new(
            format!("{}@example.com", name),
            name.to_string(),
            "hash".to_string(),
            Role::User,
        );
        f.users.create_user(&user).await.unwrap();
        user
    }

    fn result(wagered: f64, won: f64) -> GameResult {
        GameResult { wagered, won }
    }

    #[tokio::test]
    async fn test_record_game_result_updates_all_periods() {
        let f = fixture();
        let alice = user(&f, "alice").await;
        let entries = f
            .service
            .record_game_result(alice.id, result(10.0, 20.0))
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            assert_eq!(entry.standing.games_played, 1);
            assert_eq!(entry.standing.score, 11.0);
            assert_eq!(entry.username, "alice");
        }

        f.service
            .record_game_result(alice.id, result(10.0, 0.0))
            .await
            .unwrap();
        let daily = f
            .service
            .get_or_create_entry(alice.id, Period::Daily)
            .await
            .unwrap();
        assert_eq!(daily.standing.games_played, 2);
        assert_eq!(daily.standing.score, 2.0);
        assert_eq!(daily.standing.total_wagered, 20.0);
        assert_eq!(daily.standing.total_won, 20.0);
    }

    #[tokio::test]
    async fn test_achievements_reach_the_user() {
        let f = fixture();
        let alice = user(&f, "alice").await;
        f.service
            .record_game_result(alice.id, result(10.0, 20.0))
            .await
            .unwrap();
        let stored = f.users.get_user(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.achievements, vec![Achievement::Star]);

        let daily = f
            .service
            .get_or_create_entry(alice.id, Period::Daily)
            .await
            .unwrap();
        assert_eq!(daily.standing.achievements, vec![Achievement::Star]);
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_are_dense() {
        let f = fixture();
        for (name, won) in [("alice", 0.0), ("bob", 30.0), ("carol", 15.0), ("dave", 5.0)] {
            let u = user(&f, name).await;
            f.service
                .record_game_result(u.id, result(10.0, won))
                .await
                .unwrap();
        }

        let first = f
            .service
            .get_leaderboard(Period::Weekly, Pagination::new(Some(1), Some(3), 10))
            .await
            .unwrap();
        assert_eq!(first.total, 4);
        let ranks: Vec<_> = first.items.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        let names: Vec<_> = first
            .items
            .iter()
            .map(|r| r.entry.username.as_str())
            .collect();
        assert_eq!(names, vec!["bob", "carol", "dave"]);
        assert!(
            first
                .items
                .windows(2)
                .all(|w| w[0].entry.standing.score >= w[1].entry.standing.score)
        );

        let second = f
            .service
            .get_leaderboard(Period::Weekly, Pagination::new(Some(2), Some(3), 10))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].rank, 4);
        assert_eq!(second.items[0].entry.username, "alice");
    }

    #[tokio::test]
    async fn test_user_positions() {
        let f = fixture();
        let alice = user(&f, "alice").await;
        let bob = user(&f, "bob").await;
        let carol = user(&f, "carol").await;
        f.service
            .record_game_result(alice.id, result(10.0, 0.0))
            .await
            .unwrap();
        f.service
            .record_game_result(bob.id, result(10.0, 50.0))
            .await
            .unwrap();

        let positions = f.service.user_positions(alice.id).await.unwrap();
        assert_eq!(positions.len(), 3);
        for position in &positions {
            assert_eq!(position.rank, Some(2));
            assert_eq!(position.score, -9.0);
        }

        let positions = f.service.user_positions(carol.id).await.unwrap();
        assert!(positions.iter().all(|p| p.rank.is_none() && p.score == 0.0));
    }

    #[tokio::test]
    async fn test_submit_score_keeps_max() {
        let f = fixture();
        let alice = user(&f, "alice").await;
        f.service.submit_score(alice.id, 40.0).await.unwrap();
        let entries = f.service.submit_score(alice.id, 25.0).await.unwrap();
        assert!(entries.iter().all(|e| e.standing.score == 40.0));

        let err = f.service.submit_score(alice.id, -1.0).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(msg) if msg == "Invalid score"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_windows() {
        let f = fixture();
        let alice = user(&f, "alice").await;
        f.service
            .record_game_result(alice.id, result(10.0, 0.0))
            .await
            .unwrap();

        let old_start = Utc::now() - TimeDelta::days(200);
        let old = LeaderboardEntry::new(
            &alice,
            Period::Daily,
            PeriodWindow {
                start: old_start,
                end: old_start + TimeDelta::days(1),
            },
        );
        f.entries.save_entry(&old).await.unwrap();

        assert_eq!(f.service.cleanup().await.unwrap(), 1);
        assert!(
            f.entries
                .get_entry(alice.id, Period::Daily, old_start)
                .await
                .unwrap()
                .is_none()
        );
        let current = f
            .service
            .get_or_create_entry(alice.id, Period::Daily)
            .await
            .unwrap();
        assert_eq!(current.standing.games_played, 1);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_entry_locks() {
        let f = fixture();
        let alice = user(&f, "alice").await;
        let bob = user(&f, "bob").await;
        for id in [alice.id, bob.id] {
            f.service
                .record_game_result(id, result(5.0, 0.0))
                .await
                .unwrap();
        }
        assert_eq!(f.service.entry_locks.len(), 2 * Period::ALL.len());

        let held = f.service.entry_lock(bob.id, Period::Daily);
        let _guard = held.lock().await;
        f.service.cleanup().await.unwrap();
        assert_eq!(f.service.entry_locks.len(), 1);
        assert!(f.service.entry_locks.contains_key(&(bob.id, Period::Daily)));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let f = fixture();
        let err = f
            .service
            .record_game_result(Uuid::new_v4(), result(1.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
