//! Transactional URL state store.
//!
//! One row per normalized URL. Every read and write happens inside a
//! [`StoreTransaction`]; there is no non-transactional path. Row locks use
//! `FOR UPDATE SKIP LOCKED`, so a contending worker sees a locked row as
//! absent and fails fast instead of queueing on the lock; the retry scanner
//! picks the work back up later.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use thiserror::Error;
use tracing::info;

use crawld_core::PageState;

mod files;
pub use files::FileStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One `pages` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub domain: String,
    pub state: i16,
    pub remark: String,
    /// JSON array-of-arrays of normalized URLs.
    pub paths: String,
    /// JSON array of raw outbound URLs; set once, on the Success transition.
    pub sub_urls: String,
    pub fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PageRecord {
    /// A fresh Pending record, ready for [`StoreTransaction::insert`].
    /// `id` and the audit timestamps are assigned by the database.
    pub fn new_pending(url: impl Into<String>, domain: impl Into<String>, paths: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            url: url.into(),
            domain: domain.into(),
            state: PageState::Pending.as_i16(),
            remark: String::new(),
            paths,
            sub_urls: "[]".to_string(),
            fetched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn page_state(&self) -> PageState {
        PageState::from_i16(self.state).unwrap_or(PageState::Pending)
    }

    pub fn set_state(&mut self, state: PageState) {
        self.state = state.as_i16();
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

impl Storage {
    /// Connect with an explicit pool size; size it to the worker count plus
    /// headroom so controllers never starve each other for connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn begin(&self) -> Result<StoreTransaction, StoreError> {
        Ok(StoreTransaction {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A database transaction. Dropping it without [`commit`](Self::commit) rolls
/// back, so early returns never leave partial state behind.
pub struct StoreTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl StoreTransaction {
    /// Lock-read a record by normalized URL. `NotFound` covers both a truly
    /// absent row and one currently locked by another transaction
    /// (skip-locked semantics); [`exists`](Self::exists) tells them apart.
    pub async fn get_for_update(&mut self, url: &str) -> Result<PageRecord, StoreError> {
        sqlx::query_as::<_, PageRecord>(
            "SELECT * FROM pages WHERE url = $1 FOR UPDATE SKIP LOCKED",
        )
        .bind(url)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// Plain (non-locking) existence check; sees rows locked elsewhere.
    pub async fn exists(&mut self, url: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM pages WHERE url = $1")
            .bind(url)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    pub async fn insert(&mut self, record: &PageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pages (url, domain, state, remark, paths, sub_urls)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.url)
        .bind(&record.domain)
        .bind(record.state)
        .bind(&record.remark)
        .bind(&record.paths)
        .bind(&record.sub_urls)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Persist a record's mutable columns; refreshes `updated_at`.
    pub async fn update(&mut self, record: &PageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE pages
             SET domain = $2, state = $3, remark = $4, paths = $5,
                 sub_urls = $6, fetched_at = $7, updated_at = NOW()
             WHERE url = $1",
        )
        .bind(&record.url)
        .bind(&record.domain)
        .bind(record.state)
        .bind(&record.remark)
        .bind(&record.paths)
        .bind(&record.sub_urls)
        .bind(record.fetched_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Pending records whose `updated_at` precedes `cutoff`, oldest first,
    /// capped at `limit`. Used by the retry scanner to resurface stalled work.
    pub async fn pending_older_than(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PageRecord>, StoreError> {
        let records = sqlx::query_as::<_, PageRecord>(
            "SELECT * FROM pages
             WHERE state = $1 AND updated_at < $2
             ORDER BY updated_at ASC
             LIMIT $3",
        )
        .bind(PageState::Pending.as_i16())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(records)
    }

    pub async fn pending_count(&mut self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages WHERE state = $1")
            .bind(PageState::Pending.as_i16())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.0)
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
