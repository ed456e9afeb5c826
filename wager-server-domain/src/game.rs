use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;
use wager_core::{
    BetOutcome, DEFAULT_HOUSE_EDGE, DEFAULT_PAYOUT_MULTIPLIER, GameResult, OddsConfig,
    OutcomeKind, OutcomeStrategies,
};

use crate::{
    ServiceError, ServiceResult,
    leaderboard::ArcLeaderboardService,
    ledger::{ArcLedgerService, NewTransaction, TransactionKind},
    user::UserId,
};

pub type GameId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Maintenance,
    Disabled,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Maintenance => "maintenance",
            GameStatus::Disabled => "disabled",
        }
    }
}

impl FromStr for GameStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(GameStatus::Active),
            "maintenance" => Ok(GameStatus::Maintenance),
            "disabled" => Ok(GameStatus::Disabled),
            _ => ServiceError::field("status", "Invalid game status"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatistics {
    pub total_bets: u64,
    pub total_wagered: f64,
    pub total_payout: f64,
}

#[derive(Clone, Debug)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub description: String,
    pub min_bet: f64,
    pub max_bet: f64,
    pub kind: OutcomeKind,
    pub odds: OddsConfig,
    pub status: GameStatus,
    pub statistics: GameStatistics,
    pub last_played: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct GameFilter {
    pub status: Option<GameStatus>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GameDraft {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(range(min = 0.0, message = "Minimum bet cannot be negative"))]
    pub min_bet: f64,
    #[validate(range(min = 0.0, message = "Maximum bet cannot be negative"))]
    pub max_bet: f64,
    #[validate(range(min = 0.0, max = 100.0, message = "House edge must be between 0 and 100"))]
    pub house_edge: Option<f64>,
    #[validate(range(exclusive_min = 1.0, message = "Payout multiplier must exceed 1"))]
    pub payout_multiplier: Option<f64>,
    pub kind: Option<String>,
    pub status: Option<GameStatus>,
}

/// Partial update; fields left `None` keep their value.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GamePatch {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Minimum bet cannot be negative"))]
    pub min_bet: Option<f64>,
    #[validate(range(min = 0.0, message = "Maximum bet cannot be negative"))]
    pub max_bet: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "House edge must be between 0 and 100"))]
    pub house_edge: Option<f64>,
    #[validate(range(exclusive_min = 1.0, message = "Payout multiplier must exceed 1"))]
    pub payout_multiplier: Option<f64>,
    pub kind: Option<String>,
    pub status: Option<GameStatus>,
}

impl From<GameDraft> for GamePatch {
    fn from(draft: GameDraft) -> Self {
        Self {
            name: Some(draft.name),
            description: Some(draft.description),
            min_bet: Some(draft.min_bet),
            max_bet: Some(draft.max_bet),
            house_edge: draft.house_edge,
            payout_multiplier: draft.payout_multiplier,
            kind: draft.kind,
            status: draft.status,
        }
    }
}

impl GamePatch {
    fn apply(self, game: &mut Game) -> ServiceResult<()> {
        if let Some(name) = self.name {
            game.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            game.description = description.trim().to_string();
        }
        if let Some(min_bet) = self.min_bet {
            game.min_bet = min_bet;
        }
        if let Some(max_bet) = self.max_bet {
            game.max_bet = max_bet;
        }
        if let Some(house_edge) = self.house_edge {
            game.odds.house_edge = house_edge;
        }
        if let Some(payout_multiplier) = self.payout_multiplier {
            game.odds.payout_multiplier = payout_multiplier;
        }
        if let Some(kind) = self.kind {
            game.kind = parse_kind(&kind)?;
        }
        if let Some(status) = self.status {
            game.status = status;
        }
        Ok(())
    }
}

fn parse_kind(kind: &str) -> ServiceResult<OutcomeKind> {
    kind.parse()
        .or_else(|_| ServiceError::field("kind", "Kind must be house_edge or fixed_odds"))
}

fn check_game(game: &Game) -> ServiceResult<()> {
    if game.name.is_empty() {
        return ServiceError::field("name", "Name is required");
    }
    if game.description.is_empty() {
        return ServiceError::field("description", "Description is required");
    }
    if game.max_bet < game.min_bet {
        return ServiceError::field(
            "maxBet",
            "Maximum bet must be greater than or equal to minimum bet",
        );
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStatistics {
    pub total_games: u64,
    pub active_games: u64,
    pub total_bets: u64,
    pub total_wagered: f64,
    pub total_payout: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetReceipt {
    pub game_id: GameId,
    pub bet: f64,
    pub outcome: BetOutcome,
}

pub type ArcGameRepository = Arc<Box<dyn GameRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait GameRepository {
    async fn get_game(&self, id: GameId) -> ServiceResult<Option<Game>>;
    async fn get_game_by_name(&self, name: &str) -> ServiceResult<Option<Game>>;
    /// Fails with `Conflict` when the name is taken.
    async fn create_game(&self, game: &Game) -> ServiceResult<()>;
    /// Writes the editable fields; statistics are left alone.
    async fn update_game(&self, game: &Game) -> ServiceResult<()>;
    /// Atomically adds one bet to the running statistics.
    async fn record_bet(
        &self,
        id: GameId,
        wagered: f64,
        payout: f64,
        played_at: DateTime<Utc>,
    ) -> ServiceResult<()>;
    /// Most recently played first, never played games last.
    async fn get_games(&self, filter: &GameFilter) -> ServiceResult<Vec<Game>>;
}

pub type ArcRandomSource = Arc<Box<dyn RandomSource + Send + Sync + 'static>>;

pub trait RandomSource {
    /// A uniform sample in `[0, 1)`.
    fn draw(&self) -> f64;
}

pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn draw(&self) -> f64 {
        rand::random::<f64>()
    }
}

pub type ArcGameService = Arc<Box<dyn GameService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait GameService {
    async fn list_active_games(&self) -> ServiceResult<Vec<Game>>;
    async fn get_game(&self, id: GameId) -> ServiceResult<Game>;
    async fn create_game(&self, draft: GameDraft) -> ServiceResult<Game>;
    async fn update_game(&self, id: GameId, patch: GamePatch) -> ServiceResult<Game>;
    async fn disable_game(&self, id: GameId) -> ServiceResult<Game>;
    async fn place_bet(&self, user_id: UserId, game_id: GameId, amount: f64)
    -> ServiceResult<BetReceipt>;
    async fn overall_statistics(&self) -> ServiceResult<OverallStatistics>;
}

pub struct GameServiceImpl {
    game_repository: ArcGameRepository,
    ledger_service: ArcLedgerService,
    leaderboard_service: ArcLeaderboardService,
    strategies: OutcomeStrategies,
    random: ArcRandomSource,
}

impl GameServiceImpl {
    pub fn new(
        game_repository: ArcGameRepository,
        ledger_service: ArcLedgerService,
        leaderboard_service: ArcLeaderboardService,
        strategies: OutcomeStrategies,
        random: ArcRandomSource,
    ) -> Self {
        Self {
            game_repository,
            ledger_service,
            leaderboard_service,
            strategies,
            random,
        }
    }

    /// Gives back a stake that was debited for a bet that could not be settled.
    async fn refund_stake(&self, user_id: UserId, game: &Game, amount: f64) {
        let refund = NewTransaction::new(user_id, TransactionKind::Credit, amount)
            .with_game(game.id)
            .with_description("Refund of unsettled bet")
            .with_metadata(json!({ "gameName": game.name, "refund": true }));
        match self.ledger_service.create_and_process(refund).await {
            Ok(transaction) => info!(
                "Refunded stake of {} to user {} on game {} ({})",
                amount, user_id, game.id, transaction.id
            ),
            Err(e) => error!(
                "Failed to refund stake of {} to user {} on game {}: {}",
                amount, user_id, game.id, e
            ),
        }
    }

    async fn ensure_name_free(&self, name: &str, id: Option<GameId>) -> ServiceResult<()> {
        match self.game_repository.get_game_by_name(name).await? {
            Some(existing) if Some(existing.id) != id => {
                ServiceError::conflict("Game with this name already exists")
            }
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl GameService for GameServiceImpl {
    async fn list_active_games(&self) -> ServiceResult<Vec<Game>> {
        let filter = GameFilter {
            status: Some(GameStatus::Active),
        };
        self.game_repository.get_games(&filter).await
    }

    async fn get_game(&self, id: GameId) -> ServiceResult<Game> {
        match self.game_repository.get_game(id).await? {
            Some(game) => Ok(game),
            None => ServiceError::not_found("Game not found"),
        }
    }

    async fn create_game(&self, draft: GameDraft) -> ServiceResult<Game> {
        draft.validate()?;
        let mut game = Game {
            id: Uuid::new_v4(),
            name: String::new(),
            description: String::new(),
            min_bet: 0.0,
            max_bet: 0.0,
            kind: OutcomeKind::HouseEdge,
            odds: OddsConfig {
                house_edge: DEFAULT_HOUSE_EDGE,
                payout_multiplier: DEFAULT_PAYOUT_MULTIPLIER,
            },
            status: GameStatus::Active,
            statistics: GameStatistics::default(),
            last_played: None,
            created_at: Utc::now(),
        };
        GamePatch::from(draft).apply(&mut game)?;
        check_game(&game)?;
        self.ensure_name_free(&game.name, None).await?;

        self.game_repository.create_game(&game).await?;
        info!("Created game {} ({})", game.name, game.id);
        Ok(game)
    }

    async fn update_game(&self, id: GameId, patch: GamePatch) -> ServiceResult<Game> {
        patch.validate()?;
        let mut game = self.get_game(id).await?;
        patch.apply(&mut game)?;
        check_game(&game)?;
        self.ensure_name_free(&game.name, Some(id)).await?;

        self.game_repository.update_game(&game).await?;
        Ok(game)
    }

    async fn disable_game(&self, id: GameId) -> ServiceResult<Game> {
        let mut game = self.get_game(id).await?;
        game.status = GameStatus::Disabled;
        self.game_repository.update_game(&game).await?;
        info!("Disabled game {} ({})", game.name, game.id);
        Ok(game)
    }

    async fn place_bet(
        &self,
        user_id: UserId,
        game_id: GameId,
        amount: f64,
    ) -> ServiceResult<BetReceipt> {
        let game = self.get_game(game_id).await?;
        if game.status != GameStatus::Active {
            return Err(ServiceError::GameInactive);
        }
        if !(game.min_bet <= amount && amount <= game.max_bet) {
            return Err(ServiceError::InvalidBetAmount {
                min: game.min_bet,
                max: game.max_bet,
            });
        }

        self.ledger_service
            .create_and_process(
                NewTransaction::new(user_id, TransactionKind::Bet, -amount)
                    .with_game(game.id)
                    .with_metadata(json!({ "gameName": game.name })),
            )
            .await?;

        let draw = self.random.draw();
        let Some(outcome) = self
            .strategies
            .resolve(game.kind, amount, &game.odds, draw)
        else {
            self.refund_stake(user_id, &game, amount).await;
            return ServiceError::internal(format!(
                "No outcome strategy for {}",
                game.kind.as_str()
            ));
        };

        if outcome.won {
            let win = NewTransaction::new(user_id, TransactionKind::Win, outcome.payout)
                .with_game(game.id)
                .with_metadata(json!({
                    "gameName": game.name,
                    "multiplier": outcome.multiplier,
                }));
            if let Err(e) = self.ledger_service.create_and_process(win).await {
                error!(
                    "Failed to pay out {} to user {} on game {}: {}",
                    outcome.payout, user_id, game.id, e
                );
                self.refund_stake(user_id, &game, amount).await;
                return Err(e);
            }
        }

        if let Err(e) = self
            .game_repository
            .record_bet(game.id, amount, outcome.payout, Utc::now())
            .await
        {
            error!("Failed to record bet statistics for game {}: {}", game.id, e);
        }

        let result = GameResult {
            wagered: amount,
            won: outcome.payout,
        };
        if let Err(e) = self
            .leaderboard_service
            .record_game_result(user_id, result)
            .await
        {
            error!(
                "Failed to record game result for user {} on game {}: {}",
                user_id, game.id, e
            );
        }

        Ok(BetReceipt {
            game_id: game.id,
            bet: amount,
            outcome,
        })
    }

    async fn overall_statistics(&self) -> ServiceResult<OverallStatistics> {
        let games = self.game_repository.get_games(&GameFilter::default()).await?;
        Ok(games
            .iter()
            .fold(OverallStatistics::default(), |mut acc, game| {
                acc.total_games += 1;
                if game.status == GameStatus::Active {
                    acc.active_games += 1;
                }
                acc.total_bets += game.statistics.total_bets;
                acc.total_wagered += game.statistics.total_wagered;
                acc.total_payout += game.statistics.total_payout;
                acc
            }))
    }
}
