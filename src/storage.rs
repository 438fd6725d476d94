//! SQLite data source for Sitepulse.
//!
//! Holds the three relations a report is computed from:
//!
//! - `site_status`: raw polls (`site_id`, `status`, `timestamp_utc` as text)
//! - `site_timezone`: IANA timezone name per site
//! - `business_hours`: local open intervals per site and weekday
//!
//! Values are stored as text exactly as they arrive; parsing happens when a
//! report runs, so a bad row costs that row and nothing else.

use std::collections::HashMap;

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::{BusinessHoursRecord, Poll, PollRecord};

/// A point-in-time copy of everything a report needs.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub polls: Vec<PollRecord>,
    pub timezones: HashMap<String, String>,
    pub business_hours: Vec<BusinessHoursRecord>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:sitepulse.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = connect_pool(database_url).await?;
        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// The underlying pool, for components sharing the database.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS site_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id TEXT NOT NULL,
                status TEXT NOT NULL,
                timestamp_utc TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_site_status_site_ts
            ON site_status(site_id, timestamp_utc)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS site_timezone (
                site_id TEXT PRIMARY KEY,
                timezone_str TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS business_hours (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id TEXT NOT NULL,
                day_of_week INTEGER NOT NULL,
                start_time_local TEXT NOT NULL,
                end_time_local TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a typed poll.
    pub async fn insert_poll(&self, poll: &Poll) -> Result<(), sqlx::Error> {
        self.insert_poll_record(&poll.to_record()).await
    }

    /// Record a poll row as raw text.
    pub async fn insert_poll_record(&self, record: &PollRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO site_status (site_id, status, timestamp_utc)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&record.site_id)
        .bind(&record.status)
        .bind(&record.timestamp_utc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set or replace a site's timezone name.
    pub async fn set_timezone(&self, site_id: &str, timezone: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO site_timezone (site_id, timezone_str)
            VALUES (?, ?)
            ON CONFLICT(site_id) DO UPDATE SET timezone_str = excluded.timezone_str
            "#,
        )
        .bind(site_id)
        .bind(timezone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Add a business-hours interval.
    pub async fn insert_business_hours(
        &self,
        record: &BusinessHoursRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO business_hours (site_id, day_of_week, start_time_local, end_time_local)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&record.site_id)
        .bind(record.day_of_week)
        .bind(&record.start_time_local)
        .bind(&record.end_time_local)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read all three relations.
    ///
    /// Rows come back in insertion order so ties between equal timestamps
    /// resolve the same way on every run.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot, sqlx::Error> {
        let polls: Vec<PollRecord> = sqlx::query(
            r#"
            SELECT site_id, status, timestamp_utc
            FROM site_status
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| PollRecord {
            site_id: r.get("site_id"),
            status: r.get("status"),
            timestamp_utc: r.get("timestamp_utc"),
        })
        .collect();

        let timezones: HashMap<String, String> = sqlx::query(
            r#"
            SELECT site_id, timezone_str FROM site_timezone
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| (r.get("site_id"), r.get("timezone_str")))
        .collect();

        let business_hours: Vec<BusinessHoursRecord> = sqlx::query(
            r#"
            SELECT site_id, day_of_week, start_time_local, end_time_local
            FROM business_hours
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| BusinessHoursRecord {
            site_id: r.get("site_id"),
            day_of_week: r.get("day_of_week"),
            start_time_local: r.get("start_time_local"),
            end_time_local: r.get("end_time_local"),
        })
        .collect();

        Ok(Snapshot {
            polls,
            timezones,
            business_hours,
        })
    }
}

/// Open a pool for `database_url`.
///
/// Every connection to `sqlite::memory:` is a separate database, so
/// in-memory URLs get exactly one connection.
pub(crate) async fn connect_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_empty_snapshot() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        let snapshot = storage.fetch_snapshot().await.unwrap();

        assert!(snapshot.polls.is_empty());
        assert!(snapshot.timezones.is_empty());
        assert!(snapshot.business_hours.is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_fetch_polls() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        let ts = Utc.with_ymd_and_hms(2023, 1, 24, 9, 0, 0).unwrap();
        storage.insert_poll(&Poll::new("s1", true, ts)).await.unwrap();
        storage
            .insert_poll_record(&PollRecord {
                site_id: "s2".to_string(),
                status: "inactive".to_string(),
                timestamp_utc: "2023-01-24 09:05:00.123 UTC".to_string(),
            })
            .await
            .unwrap();

        let snapshot = storage.fetch_snapshot().await.unwrap();

        assert_eq!(snapshot.polls.len(), 2);
        assert_eq!(Poll::from_record(&snapshot.polls[0]).unwrap().timestamp_utc, ts);
        assert_eq!(snapshot.polls[1].site_id, "s2");
        assert_eq!(snapshot.polls[1].timestamp_utc, "2023-01-24 09:05:00.123 UTC");
    }

    #[tokio::test]
    async fn test_set_timezone_replaces() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        storage.set_timezone("s1", "America/Chicago").await.unwrap();
        storage.set_timezone("s1", "Asia/Kolkata").await.unwrap();

        let snapshot = storage.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.timezones.len(), 1);
        assert_eq!(snapshot.timezones["s1"], "Asia/Kolkata");
    }

    #[tokio::test]
    async fn test_business_hours_rows() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        let record = BusinessHoursRecord {
            site_id: "s1".to_string(),
            day_of_week: 2,
            start_time_local: "09:00:00".to_string(),
            end_time_local: "17:00:00".to_string(),
        };
        storage.insert_business_hours(&record).await.unwrap();

        let snapshot = storage.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.business_hours, vec![record]);
    }
}
