use std::sync::Arc;

use chrono::TimeDelta;
use wager_core::OutcomeStrategies;

use crate::{
    game::{ArcGameRepository, ArcGameService, ArcRandomSource, GameServiceImpl},
    jwt::ArcJwtService,
    leaderboard::{
        ArcLeaderboardRepository, ArcLeaderboardService, LeaderboardCleanupJob,
        LeaderboardServiceImpl,
    },
    ledger::{ArcLedgerService, ArcTransactionRepository, LedgerServiceImpl},
    memory::{
        InMemoryGameRepository, InMemoryLeaderboardRepository, InMemoryTransactionRepository,
        InMemoryUserRepository,
    },
    telegram::{ArcTelegramService, TelegramServiceImpl, TelegramSettings},
    user::{ArcUserRepository, ArcUserService, UserServiceImpl},
};

#[derive(Clone, Debug)]
pub struct AppSettings {
    pub token_ttl: TimeDelta,
    pub telegram: TelegramSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            token_ttl: TimeDelta::hours(24),
            telegram: TelegramSettings::default(),
        }
    }
}

#[derive(Clone)]
pub struct Repositories {
    pub users: ArcUserRepository,
    pub games: ArcGameRepository,
    pub transactions: ArcTransactionRepository,
    pub leaderboard: ArcLeaderboardRepository,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(Box::new(InMemoryUserRepository::new())),
            games: Arc::new(Box::new(InMemoryGameRepository::new())),
            transactions: Arc::new(Box::new(InMemoryTransactionRepository::new())),
            leaderboard: Arc::new(Box::new(InMemoryLeaderboardRepository::new())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub user_service: ArcUserService,
    pub ledger_service: ArcLedgerService,
    pub game_service: ArcGameService,
    pub leaderboard_service: ArcLeaderboardService,
    pub telegram_service: ArcTelegramService,
}

impl AppState {
    /// Spawns the periodic background jobs.
    pub fn start(&self) {
        let cleanup_job = LeaderboardCleanupJob::new(self.leaderboard_service.clone());
        tokio::spawn(async move {
            cleanup_job.run().await;
        });
    }
}

pub fn construct_app(
    repositories: Repositories,
    jwt_service: ArcJwtService,
    random: ArcRandomSource,
    strategies: OutcomeStrategies,
    settings: AppSettings,
) -> AppState {
    let user_service: ArcUserService = Arc::new(Box::new(UserServiceImpl::new(
        repositories.users.clone(),
        jwt_service.clone(),
        settings.token_ttl,
    )));

    let ledger_service: ArcLedgerService = Arc::new(Box::new(LedgerServiceImpl::new(
        repositories.users.clone(),
        repositories.transactions.clone(),
    )));

    let leaderboard_service: ArcLeaderboardService = Arc::new(Box::new(
        LeaderboardServiceImpl::new(repositories.users.clone(), repositories.leaderboard.clone()),
    ));

    let game_service: ArcGameService = Arc::new(Box::new(GameServiceImpl::new(
        repositories.games.clone(),
        ledger_service.clone(),
        leaderboard_service.clone(),
        strategies,
        random,
    )));

    let telegram_service: ArcTelegramService = Arc::new(Box::new(TelegramServiceImpl::new(
        repositories.users.clone(),
        jwt_service,
        settings.telegram,
    )));

    AppState {
        user_service,
        ledger_service,
        game_service,
        leaderboard_service,
        telegram_service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::RandomSource,
        jwt::mock::MockJwtService,
        user::{Registration, Role},
    };

    struct MockRandomSource;

    impl RandomSource for MockRandomSource {
        fn draw(&self) -> f64 {
            0.5
        }
    }

    #[tokio::test]
    async fn test_services_share_token_issuer() {
        let app = construct_app(
            Repositories::in_memory(),
            MockJwtService::arc(),
            Arc::new(Box::new(MockRandomSource)),
            OutcomeStrategies::default(),
            AppSettings::default(),
        );
        let session = app
            .user_service
            .register(Registration {
                email: "ann@example.com".to_string(),
                username: "ann".to_string(),
                password: "Sup3r-Secret!".to_string(),
                role: Some(Role::User),
            })
            .await
            .unwrap();
        let user = app.user_service.authenticate(&session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);
    }
}
