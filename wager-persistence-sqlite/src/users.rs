use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use wager_server_domain::{
    ServiceError, ServiceResult,
    user::{User, UserFilter, UserId, UserRepository, UserUpdate},
    util::Paginated,
};

use crate::{
    conflict_or_internal, decode_achievements, encode_achievements, from_millis, internal,
    parse_column, parse_uuid, to_millis,
};

const UNIQUE_MESSAGES: &[(&str, &str)] = &[
    ("users.email", "Email already registered"),
    ("users.username", "Username already taken"),
    ("users.telegram_id", "Telegram account already linked to another user"),
];

pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn user_from_row(row: &SqliteRow) -> sqlx::Result<User> {
        Ok(User {
            id: parse_uuid(row.try_get("id")?)?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            role: parse_column(row.try_get("role")?)?,
            status: parse_column(row.try_get("status")?)?,
            balance: row.try_get("balance")?,
            telegram_id: row.try_get("telegram_id")?,
            achievements: decode_achievements(row.try_get("achievements")?)?,
            last_active: from_millis(row.try_get("last_active")?)?,
            created_at: from_millis(row.try_get("created_at")?)?,
        })
    }

    async fn fetch_one_where(&self, column: &str, value: String) -> ServiceResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT * FROM users WHERE {} = ?", column))
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref()
            .map(Self::user_from_row)
            .transpose()
            .map_err(internal)
    }
}

#[async_trait::async_trait]
impl UserRepository for SqliteUserRepository {
    async fn get_user(&self, id: UserId) -> ServiceResult<Option<User>> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn get_user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        self.fetch_one_where("email", email.to_string()).await
    }

    async fn get_user_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        self.fetch_one_where("username", username.to_string()).await
    }

    async fn get_user_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref()
            .map(Self::user_from_row)
            .transpose()
            .map_err(internal)
    }

    async fn create_user(&self, user: &User) -> ServiceResult<()> {
        let fields = [
            "id",
            "email",
            "username",
            "password_hash",
            "role",
            "status",
            "balance",
            "telegram_id",
            "achievements",
            "last_active",
            "created_at",
        ];

        sqlx::query(&format!(
            "INSERT INTO users ({}) VALUES ({})",
            fields.join(", "),
            fields.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
        ))
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.balance)
        .bind(user.telegram_id)
        .bind(encode_achievements(&user.achievements))
        .bind(to_millis(user.last_active))
        .bind(to_millis(user.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_internal(e, UNIQUE_MESSAGES))?;

        Ok(())
    }

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> ServiceResult<()> {
        let mut sets = Vec::new();
        if update.status.is_some() {
            sets.push("status = ?");
        }
        if update.last_active.is_some() {
            sets.push("last_active = ?");
        }
        if update.telegram_id.is_some() {
            sets.push("telegram_id = ?");
        }
        if update.achievements.is_some() {
            sets.push("achievements = ?");
        }
        if sets.is_empty() {
            return Ok(());
        }

        let query_str = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&query_str);
        if let Some(status) = update.status {
            query = query.bind(status.as_str());
        }
        if let Some(last_active) = update.last_active {
            query = query.bind(to_millis(last_active));
        }
        if let Some(telegram_id) = update.telegram_id {
            query = query.bind(telegram_id);
        }
        if let Some(achievements) = &update.achievements {
            query = query.bind(encode_achievements(achievements));
        }
        let result = query
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or_internal(e, UNIQUE_MESSAGES))?;
        if result.rows_affected() == 0 {
            return ServiceError::not_found("User not found");
        }
        Ok(())
    }

    async fn compare_and_set_balance(
        &self,
        id: UserId,
        expected: f64,
        new: f64,
    ) -> ServiceResult<bool> {
        let result = sqlx::query("UPDATE users SET balance = ? WHERE id = ? AND balance = ?")
            .bind(new)
            .bind(id.to_string())
            .bind(expected)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_user(id).await? {
            Some(_) => Ok(false),
            None => ServiceError::not_found("User not found"),
        }
    }

    async fn get_users(&self, filter: &UserFilter) -> ServiceResult<Paginated<User>> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(status.as_str().to_string());
        }
        if let Some(search) = filter.search.as_ref().filter(|s| !s.is_empty()) {
            conditions.push("(instr(lower(username), ?) > 0 OR instr(lower(email), ?) > 0)");
            params.push(search.to_lowercase());
            params.push(search.to_lowercase());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_str = format!("SELECT COUNT(*) FROM users{}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_str);
        for param in &params {
            count_query = count_query.bind(param.as_str());
        }
        let total = count_query.fetch_one(&self.pool).await.map_err(internal)?;

        let page_str = format!(
            "SELECT * FROM users{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut page_query = sqlx::query(&page_str);
        for param in &params {
            page_query = page_query.bind(param.as_str());
        }
        let rows = page_query
            .bind(filter.pagination.limit as i64)
            .bind(filter.pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        let items = rows
            .iter()
            .map(Self::user_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(internal)?;

        Ok(Paginated {
            items,
            total: total as u64,
            pagination: filter.pagination,
        })
    }
}
