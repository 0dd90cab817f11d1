//! Repository layer for alarm persistence
//!
//! One JSON document per alarm id, keyed by the caller-assigned id.
//! `save_alarm` is an atomic upsert; reads after a save observe the saved
//! value because every operation goes through the same pool.

use super::models::Alarm;
use crate::error::Result;
use chrono::Utc;
use sqlx::SqlitePool;

/// Repository for alarm records
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the record for `alarm.id`.
    pub async fn save_alarm(&self, alarm: &Alarm) -> Result<()> {
        let data = serde_json::to_string(alarm)?;

        sqlx::query(
            r#"
            INSERT INTO alarms (id, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(alarm.id)
        .bind(&data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved alarm: {}", alarm.id);
        Ok(())
    }

    /// Get an alarm by id, `None` if absent.
    pub async fn get_alarm(&self, id: i64) -> Result<Option<Alarm>> {
        let data: Option<String> = sqlx::query_scalar("SELECT data FROM alarms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        data.map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(Into::into)
    }

    /// List every stored alarm.
    pub async fn list_alarms(&self) -> Result<Vec<Alarm>> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT data FROM alarms ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|d| serde_json::from_str(d).map_err(Into::into))
            .collect()
    }

    /// Delete an alarm record. Deleting an absent id is a no-op.
    pub async fn delete_alarm(&self, id: i64) -> Result<()> {
        let rows = sqlx::query("DELETE FROM alarms WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Deleted alarm {} ({} rows)", id, rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> Repository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();
        Repository::new(pool)
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip() {
        let repo = test_repo().await;
        let alarm = Alarm {
            id: 1,
            hour: 7,
            minute: 15,
            repeat_on_days: "12345".to_string(),
            ..Alarm::default()
        };

        repo.save_alarm(&alarm).await.unwrap();

        let loaded = repo.get_alarm(1).await.unwrap().unwrap();
        assert_eq!(loaded, alarm);
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let repo = test_repo().await;
        let mut alarm = Alarm {
            id: 2,
            hour: 6,
            ..Alarm::default()
        };

        repo.save_alarm(&alarm).await.unwrap();
        alarm.hour = 9;
        repo.save_alarm(&alarm).await.unwrap();

        let loaded = repo.get_alarm(2).await.unwrap().unwrap();
        assert_eq!(loaded.hour, 9);
        assert_eq!(repo.list_alarms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = test_repo().await;
        assert!(repo.get_alarm(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = test_repo().await;
        let alarm = Alarm {
            id: 3,
            ..Alarm::default()
        };
        repo.save_alarm(&alarm).await.unwrap();

        repo.delete_alarm(3).await.unwrap();
        repo.delete_alarm(3).await.unwrap();

        assert!(repo.get_alarm(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_returns_all_records() {
        let repo = test_repo().await;
        for id in [5, 1, 3] {
            repo.save_alarm(&Alarm {
                id,
                ..Alarm::default()
            })
            .await
            .unwrap();
        }

        let alarms = repo.list_alarms().await.unwrap();
        let ids: Vec<i64> = alarms.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
