use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use wager_server_domain::{
    ServiceResult,
    ledger::{
        DateRange, KindTally, Processing, Transaction, TransactionFilter, TransactionId,
        TransactionRepository,
    },
    util::Paginated,
};

use crate::{decode_error, from_millis, internal, parse_column, parse_uuid, to_millis};

pub struct SqliteTransactionRepository {
    pool: Pool<Sqlite>,
}

/// A value bound to one placeholder of a WHERE clause.
enum Param {
    Text(String),
    Millis(i64),
}

impl SqliteTransactionRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn transaction_from_row(row: &SqliteRow) -> sqlx::Result<Transaction> {
        let game_id: Option<&str> = row.try_get("game_id")?;
        let metadata: &str = row.try_get("metadata")?;
        let started_at: Option<i64> = row.try_get("started_at")?;
        let completed_at: Option<i64> = row.try_get("completed_at")?;
        Ok(Transaction {
            id: parse_uuid(row.try_get("id")?)?,
            user_id: parse_uuid(row.try_get("user_id")?)?,
            kind: parse_column(row.try_get("kind")?)?,
            amount: row.try_get("amount")?,
            description: row.try_get("description")?,
            status: parse_column(row.try_get("status")?)?,
            game_id: game_id.map(parse_uuid).transpose()?,
            metadata: serde_json::from_str(metadata)
                .map_err(|e| decode_error(format!("Invalid metadata: {}", e)))?,
            processing: Processing {
                started_at: started_at.map(from_millis).transpose()?,
                completed_at: completed_at.map(from_millis).transpose()?,
                error: row.try_get("error")?,
            },
            created_at: from_millis(row.try_get("created_at")?)?,
        })
    }

    fn range_conditions(range: &DateRange, conditions: &mut Vec<&str>, params: &mut Vec<Param>) {
        if let Some(from) = range.from {
            conditions.push("created_at >= ?");
            params.push(Param::Millis(to_millis(from)));
        }
        if let Some(to) = range.to {
            conditions.push("created_at <= ?");
            params.push(Param::Millis(to_millis(to)));
        }
    }

    fn where_clause(conditions: &[&str]) -> String {
        if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        }
    }
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Param::Text(text) => query.bind(text.as_str()),
                Param::Millis(millis) => query.bind(*millis),
            };
        }
        query
    }};
}

#[async_trait::async_trait]
impl TransactionRepository for SqliteTransactionRepository {
    async fn save_transaction(&self, transaction: &Transaction) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO transactions (id, user_id, kind, amount, description, status, game_id, \
             metadata, started_at, completed_at, error, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, amount = excluded.amount, \
             description = excluded.description, status = excluded.status, \
             game_id = excluded.game_id, metadata = excluded.metadata, \
             started_at = excluded.started_at, completed_at = excluded.completed_at, \
             error = excluded.error",
        )
        .bind(transaction.id.to_string())
        .bind(transaction.user_id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.status.as_str())
        .bind(transaction.game_id.map(|id| id.to_string()))
        .bind(transaction.metadata.to_string())
        .bind(transaction.processing.started_at.map(to_millis))
        .bind(transaction.processing.completed_at.map(to_millis))
        .bind(&transaction.processing.error)
        .bind(to_millis(transaction.created_at))
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> ServiceResult<Option<Transaction>> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref()
            .map(Self::transaction_from_row)
            .transpose()
            .map_err(internal)
    }

    async fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> ServiceResult<Paginated<Transaction>> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some(user_id) = filter.user_id {
            conditions.push("user_id = ?");
            params.push(Param::Text(user_id.to_string()));
        }
        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Param::Text(kind.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Param::Text(status.as_str().to_string()));
        }
        Self::range_conditions(&filter.range, &mut conditions, &mut params);
        let where_clause = Self::where_clause(&conditions);

        let count_str = format!("SELECT COUNT(*) FROM transactions{}", where_clause);
        let total = bind_params!(sqlx::query_scalar::<_, i64>(&count_str), &params)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;

        let page_str = format!(
            "SELECT * FROM transactions{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let rows = bind_params!(sqlx::query(&page_str), &params)
            .bind(filter.pagination.limit as i64)
            .bind(filter.pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        let items = rows
            .iter()
            .map(Self::transaction_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(internal)?;

        Ok(Paginated {
            items,
            total: total as u64,
            pagination: filter.pagination,
        })
    }

    async fn get_tallies(&self, range: &DateRange) -> ServiceResult<Vec<KindTally>> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        Self::range_conditions(range, &mut conditions, &mut params);
        let query_str = format!(
            "SELECT kind, COUNT(*) AS count, \
             SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END) AS completed, \
             SUM(amount) AS total FROM transactions{} GROUP BY kind",
            Self::where_clause(&conditions)
        );
        let rows = bind_params!(sqlx::query(&query_str), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

        rows.iter()
            .map(|row| -> sqlx::Result<KindTally> {
                let count: i64 = row.try_get("count")?;
                let completed: i64 = row.try_get("completed")?;
                Ok(KindTally {
                    kind: parse_column(row.try_get("kind")?)?,
                    count: count as u64,
                    completed: completed as u64,
                    total: row.try_get("total")?,
                })
            })
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(internal)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use uuid::Uuid;
    use wager_server_domain::{
        ledger::{TransactionKind, TransactionStatus},
        util::Pagination,
    };

    use super::*;
    use crate::test_pool;

    fn transaction(user_id: Uuid, kind: TransactionKind, amount: f64) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind,
            amount,
            description: None,
            status: TransactionStatus::Pending,
            game_id: None,
            metadata: json!({}),
            processing: Processing {
                started_at: Some(now),
                ..Default::default()
            },
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let repo = SqliteTransactionRepository::new(test_pool().await);
        let game_id = Uuid::new_v4();
        let mut bet = transaction(Uuid::new_v4(), TransactionKind::Bet, 25.0);
        bet.game_id = Some(game_id);
        bet.metadata = json!({ "betAmount": 25.0 });
        repo.save_transaction(&bet).await.unwrap();

        bet.status = TransactionStatus::Failed;
        bet.processing.error = Some("Insufficient balance".to_string());
        bet.processing.completed_at = Some(Utc::now());
        repo.save_transaction(&bet).await.unwrap();

        let fetched = repo.get_transaction(bet.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Failed);
        assert_eq!(fetched.game_id, Some(game_id));
        assert_eq!(fetched.metadata, json!({ "betAmount": 25.0 }));
        assert_eq!(
            fetched.processing.error.as_deref(),
            Some("Insufficient balance")
        );
        assert!(fetched.processing.completed_at.is_some());
        assert!(repo.get_transaction(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filter_and_paginate() {
        let repo = SqliteTransactionRepository::new(test_pool().await);
        let ann = Uuid::new_v4();
        let now = Utc::now();
        for (i, kind) in [
            TransactionKind::Deposit,
            TransactionKind::Bet,
            TransactionKind::Bet,
        ]
        .into_iter()
        .enumerate()
        {
            let mut t = transaction(ann, kind, 10.0);
            t.created_at = now - TimeDelta::hours(i as i64);
            repo.save_transaction(&t).await.unwrap();
        }
        let mut old = transaction(ann, TransactionKind::Bet, 10.0);
        old.created_at = now - TimeDelta::days(10);
        repo.save_transaction(&old).await.unwrap();
        repo.save_transaction(&transaction(Uuid::new_v4(), TransactionKind::Bet, 10.0))
            .await
            .unwrap();

        let bets = repo
            .get_transactions(&TransactionFilter {
                user_id: Some(ann),
                kind: Some(TransactionKind::Bet),
                range: DateRange {
                    from: Some(now - TimeDelta::days(1)),
                    to: None,
                },
                pagination: Pagination { page: 1, limit: 1 },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(bets.total, 2);
        assert_eq!(bets.items.len(), 1);
        assert_eq!(
            bets.items[0].created_at.timestamp_millis(),
            (now - TimeDelta::hours(1)).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_tallies() {
        let repo = SqliteTransactionRepository::new(test_pool().await);
        let user = Uuid::new_v4();
        let mut completed = transaction(user, TransactionKind::Bet, 10.0);
        completed.status = TransactionStatus::Completed;
        repo.save_transaction(&completed).await.unwrap();
        repo.save_transaction(&transaction(user, TransactionKind::Bet, 30.0))
            .await
            .unwrap();
        repo.save_transaction(&transaction(user, TransactionKind::Win, 5.0))
            .await
            .unwrap();

        let mut tallies = repo.get_tallies(&DateRange::default()).await.unwrap();
        tallies.sort_by_key(|t| t.kind.as_str());
        assert_eq!(
            tallies,
            vec![
                KindTally {
                    kind: TransactionKind::Bet,
                    count: 2,
                    completed: 1,
                    total: 40.0,
                },
                KindTally {
                    kind: TransactionKind::Win,
                    count: 1,
                    completed: 0,
                    total: 5.0,
                },
            ]
        );

        let future = DateRange {
            from: Some(Utc::now() + TimeDelta::days(1)),
            to: None,
        };
        assert!(repo.get_tallies(&future).await.unwrap().is_empty());
    }
}
