//! 시세 및 작업 실행 기록 저장소.
//!
//! - [`PgStore`]: PostgreSQL (운영)
//! - [`MemoryStore`]: 인메모리 (DATABASE_URL 미설정, 테스트)

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricewatch_core::{JobRun, Quote};
use uuid::Uuid;

/// 저장소 에러.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 존재하지 않거나 이미 종료된 실행 기록
    #[error("Job run {0} is not running")]
    RunNotRunning(Uuid),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// 시세 저장소.
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// 시세 하나를 저장합니다.
    async fn save_quote(&self, quote: &Quote) -> Result<(), StorageError>;

    /// 여러 시세를 한 번에 저장합니다. 저장된 행 수를 반환합니다.
    async fn save_quotes(&self, quotes: &[Quote]) -> Result<usize, StorageError>;

    /// 종목의 최신 시세를 조회합니다.
    async fn latest_quote(&self, ticker: &str) -> Result<Option<Quote>, StorageError>;
}

/// 작업 실행 기록 저장소.
///
/// `complete_run`/`fail_run`은 `running` 상태의 기록에만 적용됩니다.
/// 종료된 기록을 다시 종료하려 하면 [`StorageError::RunNotRunning`].
#[async_trait]
pub trait JobRunRepository: Send + Sync {
    /// `running` 상태의 실행 기록을 생성합니다.
    async fn create_run(&self, task_name: &str) -> Result<Uuid, StorageError>;

    /// 실행을 `completed`로 전이합니다.
    async fn complete_run(&self, run_id: Uuid, duration: Duration) -> Result<(), StorageError>;

    /// 실행을 `failed`로 전이합니다.
    async fn fail_run(
        &self,
        run_id: Uuid,
        duration: Duration,
        error: &str,
    ) -> Result<(), StorageError>;

    /// 최근 실행 기록 (시작 시각 내림차순).
    async fn recent_runs(&self, limit: usize) -> Result<Vec<JobRun>, StorageError>;

    /// `older_than` 이전에 시작한 종료된 기록을 삭제합니다. 삭제된 행 수를 반환합니다.
    async fn prune_runs(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Duration → 밀리초 (i64 상한)
pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
