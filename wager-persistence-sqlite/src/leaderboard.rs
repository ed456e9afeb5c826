use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use wager_core::{Period, PeriodWindow, Standing};
use wager_server_domain::{
    ServiceResult,
    leaderboard::{LeaderboardEntry, LeaderboardRepository},
    user::UserId,
    util::{Paginated, Pagination},
};

use crate::{
    decode_achievements, encode_achievements, from_millis, internal, parse_column, parse_uuid,
    to_millis,
};

pub struct SqliteLeaderboardRepository {
    pool: Pool<Sqlite>,
}

impl SqliteLeaderboardRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn entry_from_row(row: &SqliteRow) -> sqlx::Result<LeaderboardEntry> {
        let games_played: i64 = row.try_get("games_played")?;
        Ok(LeaderboardEntry {
            id: parse_uuid(row.try_get("id")?)?,
            user_id: parse_uuid(row.try_get("user_id")?)?,
            username: row.try_get("username")?,
            period: parse_column(row.try_get("period")?)?,
            window: PeriodWindow {
                start: from_millis(row.try_get("period_start")?)?,
                end: from_millis(row.try_get("period_end")?)?,
            },
            standing: Standing {
                score: row.try_get("score")?,
                games_played: games_played as u64,
                total_wagered: row.try_get("total_wagered")?,
                total_won: row.try_get("total_won")?,
                achievements: decode_achievements(row.try_get("achievements")?)?,
            },
            last_active: from_millis(row.try_get("last_active")?)?,
        })
    }
}

#[async_trait::async_trait]
impl LeaderboardRepository for SqliteLeaderboardRepository {
    async fn get_entry(
        &self,
        user_id: UserId,
        period: Period,
        period_start: DateTime<Utc>,
    ) -> ServiceResult<Option<LeaderboardEntry>> {
        let row = sqlx::query(
            "SELECT * FROM leaderboard_entries WHERE user_id = ? AND period = ? AND period_start = ?",
        )
        .bind(user_id.to_string())
        .bind(period.as_str())
        .bind(to_millis(period_start))
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        row.as_ref()
            .map(Self::entry_from_row)
            .transpose()
            .map_err(internal)
    }

    async fn save_entry(&self, entry: &LeaderboardEntry) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO leaderboard_entries (id, user_id, username, period, period_start, \
             period_end, score, games_played, total_wagered, total_won, achievements, \
             last_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id, period, period_start) DO UPDATE SET \
             username = excluded.username, period_end = excluded.period_end, \
             score = excluded.score, games_played = excluded.games_played, \
             total_wagered = excluded.total_wagered, total_won = excluded.total_won, \
             achievements = excluded.achievements, last_active = excluded.last_active",
        )
        .bind(entry.id.to_string())
        .bind(entry.user_id.to_string())
        .bind(&entry.username)
        .bind(entry.period.as_str())
        .bind(to_millis(entry.window.start))
        .bind(to_millis(entry.window.end))
        .bind(entry.standing.score)
        .bind(entry.standing.games_played as i64)
        .bind(entry.standing.total_wagered)
        .bind(entry.standing.total_won)
        .bind(encode_achievements(&entry.standing.achievements))
        .bind(to_millis(entry.last_active))
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_entries(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<LeaderboardEntry>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leaderboard_entries WHERE period = ? AND period_start = ?",
        )
        .bind(period.as_str())
        .bind(to_millis(period_start))
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;

        let rows = sqlx::query(
            "SELECT * FROM leaderboard_entries WHERE period = ? AND period_start = ? \
             ORDER BY score DESC, last_active ASC LIMIT ? OFFSET ?",
        )
        .bind(period.as_str())
        .bind(to_millis(period_start))
        .bind(pagination.limit as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        let items = rows
            .iter()
            .map(Self::entry_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(internal)?;

        Ok(Paginated {
            items,
            total: total as u64,
            pagination,
        })
    }

    async fn count_higher_scores(
        &self,
        period: Period,
        period_start: DateTime<Utc>,
        score: f64,
    ) -> ServiceResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leaderboard_entries \
             WHERE period = ? AND period_start = ? AND score > ?",
        )
        .bind(period.as_str())
        .bind(to_millis(period_start))
        .bind(score)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(count as u64)
    }

    async fn delete_entries_ending_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<u64> {
        let result = sqlx::query("DELETE FROM leaderboard_entries WHERE period_end < ?")
            .bind(to_millis(cutoff))
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use uuid::Uuid;
    use wager_core::Achievement;

    use super::*;
    use crate::test_pool;

    fn window() -> PeriodWindow {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        PeriodWindow {
            start,
            end: start + TimeDelta::days(1) - TimeDelta::milliseconds(1),
        }
    }

    fn entry(username: &str, score: f64, last_active: DateTime<Utc>) -> LeaderboardEntry {
        LeaderboardEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            period: Period::Daily,
            window: window(),
            standing: Standing {
                score,
                ..Default::default()
            },
            last_active,
        }
    }

    #[tokio::test]
    async fn test_save_keeps_first_id() {
        let repo = SqliteLeaderboardRepository::new(test_pool().await);
        let mut ann = entry("ann", 5.0, Utc::now());
        repo.save_entry(&ann).await.unwrap();

        let first_id = ann.id;
        ann.id = Uuid::new_v4();
        ann.standing.score = 12.5;
        ann.standing.games_played = 3;
        ann.standing.achievements = vec![Achievement::Trophy];
        repo.save_entry(&ann).await.unwrap();

        let stored = repo
            .get_entry(ann.user_id, Period::Daily, window().start)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first_id);
        assert_eq!(stored.standing.score, 12.5);
        assert_eq!(stored.standing.games_played, 3);
        assert_eq!(stored.standing.achievements, vec![Achievement::Trophy]);
        assert_eq!(stored.window, window());
        assert!(
            repo.get_entry(ann.user_id, Period::Weekly, window().start)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_ordering_and_counts() {
        let repo = SqliteLeaderboardRepository::new(test_pool().await);
        let now = Utc::now();
        let early = entry("early", 10.0, now - TimeDelta::minutes(5));
        let late = entry("late", 10.0, now);
        let top = entry("top", 50.0, now);
        for e in [&late, &early, &top] {
            repo.save_entry(e).await.unwrap();
        }

        let page = repo
            .get_entries(Period::Daily, window().start, Pagination { page: 1, limit: 10 })
            .await
            .unwrap();
        let names: Vec<_> = page.items.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["top", "early", "late"]);
        assert_eq!(page.total, 3);

        let second = repo
            .get_entries(Period::Daily, window().start, Pagination { page: 2, limit: 2 })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].username, "late");

        let higher = repo
            .count_higher_scores(Period::Daily, window().start, 10.0)
            .await
            .unwrap();
        assert_eq!(higher, 1);
    }

    #[tokio::test]
    async fn test_delete_old_entries() {
        let repo = SqliteLeaderboardRepository::new(test_pool().await);
        repo.save_entry(&entry("ann", 1.0, Utc::now())).await.unwrap();

        let kept = repo
            .delete_entries_ending_before(window().end)
            .await
            .unwrap();
        assert_eq!(kept, 0);
        let removed = repo
            .delete_entries_ending_before(window().end + TimeDelta::milliseconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
