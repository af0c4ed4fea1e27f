//! 요청 제한 시세 수집기와 장 운영 시간 스케줄러.
//!
//! 이 crate는 다음을 제공합니다:
//! - 전역 토큰 버킷 요청 제한 ([`RateLimiter`])
//! - 에러 분류 기반 재시도 시세 조회 ([`FetchClient`])
//! - 동시성 제한 배치 실행 ([`BatchExecutor`])
//! - 작업 실행 기록 ([`JobExecutionLogger`])
//! - 장 운영 시간을 반영하는 스케줄러 ([`Scheduler`])

pub mod app;
pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod job_logger;
pub mod jobs;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use app::App;
pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use executor::{BatchExecutor, BatchResult, ItemFailure};
pub use fetch::{FetchClient, FetchError, QuoteFetcher};
pub use job_logger::{JobExecutionLogger, JobOutcome};
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};
pub use retry::{ErrorClassifier, RetryClass, RetryPolicy};
pub use scheduler::{MarketHours, Scheduler, SchedulerError, SchedulerState};
pub use stats::CollectionStats;
