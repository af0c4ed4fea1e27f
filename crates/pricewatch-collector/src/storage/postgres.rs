//! PostgreSQL 저장소.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricewatch_core::{JobRun, JobStatus, Quote};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{duration_ms, JobRunRepository, PriceRepository, StorageError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS price_quotes (
        id BIGSERIAL PRIMARY KEY,
        ticker TEXT NOT NULL,
        price NUMERIC(20, 6) NOT NULL,
        previous_close NUMERIC(20, 6),
        currency TEXT,
        fetched_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_price_quotes_ticker_time
        ON price_quotes (ticker, fetched_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_runs (
        id UUID PRIMARY KEY,
        task_name TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        completed_at TIMESTAMPTZ,
        duration_ms BIGINT NOT NULL DEFAULT 0,
        error TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_job_runs_started
        ON job_runs (started_at DESC)
    "#,
];

type JobRunRow = (
    Uuid,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    i64,
    Option<String>,
);

/// PostgreSQL 저장소.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 테이블과 인덱스를 생성합니다 (이미 있으면 무시).
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("스키마 확인 완료");
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: JobStatus,
        duration: Duration,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = $2, completed_at = NOW(), duration_ms = $3, error = $4
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(duration_ms(duration))
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RunNotRunning(run_id));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceRepository for PgStore {
    async fn save_quote(&self, quote: &Quote) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO price_quotes (ticker, price, previous_close, currency, fetched_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&quote.ticker)
        .bind(quote.price)
        .bind(quote.previous_close)
        .bind(&quote.currency)
        .bind(quote.fetched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_quotes(&self, quotes: &[Quote]) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;
        for quote in quotes {
            sqlx::query(
                r#"
                INSERT INTO price_quotes (ticker, price, previous_close, currency, fetched_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&quote.ticker)
            .bind(quote.price)
            .bind(quote.previous_close)
            .bind(&quote.currency)
            .bind(quote.fetched_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = quotes.len(), "시세 일괄 저장");
        Ok(quotes.len())
    }

    async fn latest_quote(&self, ticker: &str) -> Result<Option<Quote>, StorageError> {
        let quote = sqlx::query_as::<_, Quote>(
            r#"
            SELECT ticker, price, previous_close, currency, fetched_at
            FROM price_quotes
            WHERE ticker = $1
            ORDER BY fetched_at DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;
        Ok(quote)
    }
}

#[async_trait]
impl JobRunRepository for PgStore {
    async fn create_run(&self, task_name: &str) -> Result<Uuid, StorageError> {
        let run = JobRun::start(task_name);
        sqlx::query(
            r#"
            INSERT INTO job_runs (id, task_name, status, started_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(run.id)
        .bind(&run.task_name)
        .bind(run.status.as_str())
        .bind(run.started_at)
        .execute(&self.pool)
        .await?;
        Ok(run.id)
    }

    async fn complete_run(&self, run_id: Uuid, duration: Duration) -> Result<(), StorageError> {
        self.finish_run(run_id, JobStatus::Completed, duration, None)
            .await
    }

    async fn fail_run(
        &self,
        run_id: Uuid,
        duration: Duration,
        error: &str,
    ) -> Result<(), StorageError> {
        self.finish_run(run_id, JobStatus::Failed, duration, Some(error))
            .await
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<JobRun>, StorageError> {
        let rows: Vec<JobRunRow> = sqlx::query_as(
            r#"
            SELECT id, task_name, status, started_at, completed_at, duration_ms, error
            FROM job_runs
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, task_name, status, started_at, completed_at, duration_ms, error)| {
                let status = status
                    .parse::<JobStatus>()
                    .map_err(|e| StorageError::InvalidRow(e.to_string()))?;
                Ok(JobRun {
                    id,
                    task_name,
                    status,
                    started_at,
                    completed_at,
                    duration_ms,
                    error,
                })
            })
            .collect()
    }

    async fn prune_runs(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            DELETE FROM job_runs
            WHERE started_at < $1 AND status <> 'running'
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
