//! 작업 실행 기록 래퍼.
//!
//! 작업 본문을 `running → completed | failed` 실행 기록으로 감쌉니다.
//! 기록 저장 실패는 경고만 남기고 작업 실행을 막지 않습니다.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use pricewatch_core::JobStatus;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::storage::JobRunRepository;
use crate::Result;

/// 작업 실행 결과 요약.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// 실행 기록 ID (기록 생성 실패 시 None)
    pub run_id: Option<Uuid>,
    /// 최종 상태
    pub status: JobStatus,
    /// 소요 시간
    pub duration: Duration,
    /// 실패 사유
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// 작업 실행 기록기.
#[derive(Clone)]
pub struct JobExecutionLogger {
    runs: Arc<dyn JobRunRepository>,
}

impl JobExecutionLogger {
    pub fn new(runs: Arc<dyn JobRunRepository>) -> Self {
        Self { runs }
    }

    /// 작업을 실행하고 결과를 기록합니다.
    ///
    /// 작업 에러와 panic은 모두 `failed`로 기록되며 호출자에게 전파되지 않습니다.
    pub async fn execute<F, Fut>(&self, task_name: &str, job: F) -> JobOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let run_id = match self.runs.create_run(task_name).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(task = task_name, error = %e, "실행 기록 생성 실패, 작업은 계속 진행");
                None
            }
        };

        info!(task = task_name, run_id = ?run_id, "작업 시작");
        let start = Instant::now();

        let result = match AssertUnwindSafe(job()).catch_unwind().await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err("job panicked".to_string()),
        };
        let duration = start.elapsed();

        let (status, error_text) = match result {
            Ok(()) => {
                info!(
                    task = task_name,
                    elapsed = format!("{:.1}s", duration.as_secs_f64()),
                    "작업 완료"
                );
                (JobStatus::Completed, None)
            }
            Err(e) => {
                error!(
                    task = task_name,
                    elapsed = format!("{:.1}s", duration.as_secs_f64()),
                    error = %e,
                    "작업 실패"
                );
                (JobStatus::Failed, Some(e))
            }
        };

        if let Some(id) = run_id {
            let update = match &error_text {
                None => self.runs.complete_run(id, duration).await,
                Some(e) => self.runs.fail_run(id, duration, e).await,
            };
            if let Err(e) = update {
                warn!(task = task_name, run_id = %id, error = %e, "실행 기록 갱신 실패");
            }
        }

        JobOutcome {
            run_id,
            status,
            duration,
            error: error_text,
        }
    }
}
