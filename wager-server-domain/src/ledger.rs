use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    ServiceError, ServiceResult,
    game::GameId,
    user::{ArcUserRepository, UserId, UserStatus},
    util::{Paginated, Pagination},
};

pub type TransactionId = Uuid;

/// Attempts at the balance compare-and-set before giving up.
pub(crate) const MAX_BALANCE_ATTEMPTS: usize = 5;

pub const MIN_TRANSACTION_AMOUNT: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Bet,
    Win,
    Credit,
    Debit,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 6] = [
        TransactionKind::Deposit,
        TransactionKind::Withdrawal,
        TransactionKind::Bet,
        TransactionKind::Win,
        TransactionKind::Credit,
        TransactionKind::Debit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Bet => "bet",
            TransactionKind::Win => "win",
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }

    pub fn increases_balance(&self) -> bool {
        matches!(
            self,
            TransactionKind::Deposit | TransactionKind::Win | TransactionKind::Credit
        )
    }

    /// Kinds only an admin can issue.
    pub fn is_admin(&self) -> bool {
        matches!(self, TransactionKind::Credit | TransactionKind::Debit)
    }

    /// The balance delta of a transaction of this kind, whatever sign `amount` was given with.
    pub fn signed(&self, amount: f64) -> f64 {
        if self.increases_balance() {
            amount.abs()
        } else {
            -amount.abs()
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ServiceError::BadRequest("Invalid transaction type".to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => ServiceError::bad_request("Invalid status"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Processing {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub game_id: Option<GameId>,
    pub metadata: Value,
    pub processing: Processing,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: Option<String>,
    pub game_id: Option<GameId>,
    pub metadata: Value,
}

impl NewTransaction {
    pub fn new(user_id: UserId, kind: TransactionKind, amount: f64) -> Self {
        Self {
            user_id,
            kind,
            amount,
            description: None,
            game_id: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_game(mut self, game_id: GameId) -> Self {
        self.game_id = Some(game_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn into_pending(self) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            kind: self.kind,
            amount: self.amount,
            description: self.description,
            status: TransactionStatus::Pending,
            game_id: self.game_id,
            metadata: self.metadata,
            processing: Processing {
                started_at: Some(now),
                ..Default::default()
            },
            created_at: now,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| from <= instant) && self.to.is_none_or(|to| instant <= to)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub range: DateRange,
    pub pagination: Pagination,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.user_id.is_none_or(|id| id == transaction.user_id)
            && self.kind.is_none_or(|kind| kind == transaction.kind)
            && self.status.is_none_or(|status| status == transaction.status)
            && self.range.contains(transaction.created_at)
    }
}

/// Raw per-kind aggregate, as counted by a repository.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KindTally {
    pub kind: TransactionKind,
    pub count: u64,
    pub completed: u64,
    pub total: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStatistics {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub count: u64,
    pub total: f64,
    pub average: f64,
    /// Percentage of completed transactions.
    pub success_rate: f64,
}

impl From<KindTally> for KindStatistics {
    fn from(tally: KindTally) -> Self {
        let (average, success_rate) = if tally.count == 0 {
            (0.0, 0.0)
        } else {
            (
                tally.total / tally.count as f64,
                tally.completed as f64 / tally.count as f64 * 100.0,
            )
        };
        Self {
            kind: tally.kind,
            count: tally.count,
            total: tally.total,
            average,
            success_rate,
        }
    }
}

pub type ArcTransactionRepository = Arc<Box<dyn TransactionRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait TransactionRepository {
    /// Inserts or overwrites the record with the same id.
    async fn save_transaction(&self, transaction: &Transaction) -> ServiceResult<()>;
    async fn get_transaction(&self, id: TransactionId) -> ServiceResult<Option<Transaction>>;
    /// Newest first.
    async fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> ServiceResult<Paginated<Transaction>>;
    async fn get_tallies(&self, range: &DateRange) -> ServiceResult<Vec<KindTally>>;
}

pub type ArcLedgerService = Arc<Box<dyn LedgerService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait LedgerService {
    /// Applies a pending transaction to its user's balance and records the final state.
    async fn process(&self, transaction: Transaction) -> ServiceResult<Transaction>;
    async fn create_and_process(&self, transaction: NewTransaction) -> ServiceResult<Transaction>;
    async fn create_admin_transaction(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: f64,
        description: &str,
    ) -> ServiceResult<Transaction>;
    /// Deposits and withdrawals requested by the user.
    async fn create_user_transaction(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: f64,
        metadata: Option<Value>,
    ) -> ServiceResult<Transaction>;
    async fn get_transaction(&self, id: TransactionId) -> ServiceResult<Transaction>;
    async fn get_transactions(
        &self,
        filter: TransactionFilter,
    ) -> ServiceResult<Paginated<Transaction>>;
    async fn get_statistics(&self, range: DateRange) -> ServiceResult<Vec<KindStatistics>>;
    async fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        error: Option<String>,
    ) -> ServiceResult<Transaction>;
}

pub struct LedgerServiceImpl {
    user_repository: ArcUserRepository,
    transaction_repository: ArcTransactionRepository,
}

impl LedgerServiceImpl {
    pub fn new(
        user_repository: ArcUserRepository,
        transaction_repository: ArcTransactionRepository,
    ) -> Self {
        Self {
            user_repository,
            transaction_repository,
        }
    }

    async fn apply_to_balance(&self, transaction: &Transaction) -> ServiceResult<()> {
        let delta = transaction.kind.signed(transaction.amount);
        for attempt in 1..=MAX_BALANCE_ATTEMPTS {
            let Some(user) = self.user_repository.get_user(transaction.user_id).await? else {
                return ServiceError::not_found("User not found");
            };
            if transaction.kind.is_admin() && user.status == UserStatus::Suspended {
                return Err(ServiceError::AccountSuspended);
            }
            let balance = user.balance + delta;
            if balance < 0.0 {
                return Err(ServiceError::InsufficientBalance);
            }
            if self
                .user_repository
                .compare_and_set_balance(user.id, user.balance, balance)
                .await?
            {
                return Ok(());
            }
            debug!(
                "Balance of user {} changed concurrently, attempt {}",
                user.id, attempt
            );
        }
        ServiceError::internal("Balance update contention")
    }

    fn check_amount(amount: f64) -> ServiceResult<()> {
        if !amount.is_finite() || amount < MIN_TRANSACTION_AMOUNT {
            return ServiceError::field("amount", "Amount must be at least 0.01");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerService for LedgerServiceImpl {
    async fn process(&self, mut transaction: Transaction) -> ServiceResult<Transaction> {
        if transaction.status != TransactionStatus::Pending {
            return ServiceError::bad_request("Transaction already processed");
        }

        match self.apply_to_balance(&transaction).await {
            Ok(()) => {
                transaction.status = TransactionStatus::Completed;
                transaction.processing.completed_at = Some(Utc::now());
                self.transaction_repository
                    .save_transaction(&transaction)
                    .await?;
                Ok(transaction)
            }
            Err(e) => {
                transaction.status = TransactionStatus::Failed;
                transaction.processing.error = Some(e.message());
                if let Err(save_err) = self
                    .transaction_repository
                    .save_transaction(&transaction)
                    .await
                {
                    warn!(
                        "Failed to record failed transaction {}: {}",
                        transaction.id, save_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn create_and_process(&self, transaction: NewTransaction) -> ServiceResult<Transaction> {
        let transaction = transaction.into_pending();
        self.transaction_repository
            .save_transaction(&transaction)
            .await?;
        self.process(transaction).await
    }

    async fn create_admin_transaction(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: f64,
        description: &str,
    ) -> ServiceResult<Transaction> {
        if !kind.is_admin() {
            return ServiceError::bad_request("Invalid admin transaction type");
        }
        let description = description.trim();
        if description.is_empty() {
            return ServiceError::field(
                "description",
                "Description is required for admin transactions",
            );
        }
        Self::check_amount(amount)?;

        let transaction = self
            .create_and_process(
                NewTransaction::new(user_id, kind, kind.signed(amount))
                    .with_description(description),
            )
            .await?;
        info!(
            "Admin {} of {} for user {}",
            kind.as_str(),
            amount,
            user_id
        );
        Ok(transaction)
    }

    async fn create_user_transaction(
        &self,
        user_id: UserId,
        kind: TransactionKind,
        amount: f64,
        metadata: Option<Value>,
    ) -> ServiceResult<Transaction> {
        if !matches!(kind, TransactionKind::Deposit | TransactionKind::Withdrawal) {
            return ServiceError::field("type", "Type must be deposit or withdrawal");
        }
        Self::check_amount(amount)?;

        let mut transaction = NewTransaction::new(user_id, kind, kind.signed(amount));
        if let Some(metadata) = metadata {
            transaction = transaction.with_metadata(metadata);
        }
        self.create_and_process(transaction).await
    }

    async fn get_transaction(&self, id: TransactionId) -> ServiceResult<Transaction> {
        match self.transaction_repository.get_transaction(id).await? {
            Some(transaction) => Ok(transaction),
            None => ServiceError::not_found("Transaction not found"),
        }
    }

    async fn get_transactions(
        &self,
        filter: TransactionFilter,
    ) -> ServiceResult<Paginated<Transaction>> {
        self.transaction_repository.get_transactions(&filter).await
    }

    async fn get_statistics(&self, range: DateRange) -> ServiceResult<Vec<KindStatistics>> {
        let mut tallies = self.transaction_repository.get_tallies(&range).await?;
        tallies.sort_by_key(|tally| tally.kind.as_str());
        Ok(tallies.into_iter().map(KindStatistics::from).collect())
    }

    async fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        error: Option<String>,
    ) -> ServiceResult<Transaction> {
        if status == TransactionStatus::Pending {
            return ServiceError::bad_request("Invalid status");
        }
        let mut transaction = self.get_transaction(id).await?;
        if transaction.status != TransactionStatus::Pending {
            return ServiceError::bad_request("Can only update pending transactions");
        }

        transaction.status = status;
        transaction.processing.completed_at = Some(Utc::now());
        if status == TransactionStatus::Failed {
            transaction.processing.error =
                Some(error.unwrap_or_else(|| "Transaction rejected by admin".to_string()));
        }
        self.transaction_repository
            .save_transaction(&transaction)
            .await?;
        Ok(transaction)
    }
}
