//! 에러 타입 정의.

use pricewatch_notification::NotificationError;

use crate::fetch::FetchError;
use crate::scheduler::SchedulerError;
use crate::storage::StorageError;

/// Collector 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 데이터베이스 연결 에러
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 저장소 에러
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 시세 조회 에러
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// 스케줄러 에러
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// 알림 에러
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// 작업 실행 실패
    #[error("Job failed: {0}")]
    Job(String),

    /// 일반 에러
    #[error("Error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<std::env::VarError> for CollectorError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
