//! Report artifact store and signed retrieval links.
//!
//! A finished report is written once under its job id. Clients never read
//! the store directly: they get a link that carries an expiry timestamp and
//! an HMAC-SHA256 signature over `"<key>:<expires>"`, which the download
//! endpoint checks before serving the body.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use crate::error::ArtifactError;

type HmacSha256 = Hmac<Sha256>;

/// A stored report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Durable, write-once storage for report payloads.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether an artifact exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, ArtifactError>;

    /// Store `body` under `key`. Fails if the key is taken.
    async fn put(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<(), ArtifactError>;

    /// Load the artifact under `key`.
    async fn get(&self, key: &str) -> Result<Artifact, ArtifactError>;
}

/// Artifact store backed by a SQLite table.
#[derive(Clone)]
pub struct SqliteArtifactStore {
    pool: SqlitePool,
}

impl SqliteArtifactStore {
    /// Wrap a pool and create the artifact table if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self, ArtifactError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS report_artifacts (
                key TEXT PRIMARY KEY,
                content_type TEXT NOT NULL,
                body BLOB NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn exists(&self, key: &str) -> Result<bool, ArtifactError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as n FROM report_artifacts WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    async fn put(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<(), ArtifactError> {
        let result = sqlx::query(
            r#"
            INSERT INTO report_artifacts (key, content_type, body, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(body)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ArtifactError::AlreadyExists(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &str) -> Result<Artifact, ArtifactError> {
        let row = sqlx::query(
            r#"
            SELECT key, content_type, body, created_at
            FROM report_artifacts
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ArtifactError::NotFound(key.to_string()))?;

        let created_at: i64 = row.get("created_at");
        Ok(Artifact {
            key: row.get("key"),
            content_type: row.get("content_type"),
            body: row.get("body"),
            created_at: Utc.timestamp_opt(created_at, 0).single().unwrap_or_default(),
        })
    }
}

/// Issues and checks time-limited retrieval links.
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
    public_url: String,
    ttl: TimeDelta,
}

impl LinkSigner {
    pub fn new(secret: impl Into<Vec<u8>>, public_url: &str, ttl: TimeDelta) -> Self {
        Self {
            secret: secret.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
            ttl,
        }
    }

    /// A link to the artifact under `key`, valid until `now + ttl`.
    pub fn sign(&self, key: &str, now: DateTime<Utc>) -> String {
        let expires = (now + self.ttl).timestamp();
        format!(
            "{}/reports/{}/download?expires={}&signature={}",
            self.public_url,
            urlencoding::encode(key),
            expires,
            self.signature(key, expires)
        )
    }

    /// Check a link's signature and expiry.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if now.timestamp() > expires {
            return false;
        }

        let Ok(expected) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(signed_payload(key, expires).as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut mac = self.mac();
        mac.update(signed_payload(key, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }
}

fn signed_payload(key: &str, expires: i64) -> String {
    format!("{key}:{expires}")
}
