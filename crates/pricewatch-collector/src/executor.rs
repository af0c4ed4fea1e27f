//! 동시성 제한 배치 실행기.
//!
//! 키 목록을 공유 큐에 넣고 `min(max_concurrency, 키 수)`개의 워커가 꺼내 처리합니다.
//! 항목 하나의 실패나 panic은 해당 항목에만 기록되고 배치는 계속 진행됩니다.

use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use pricewatch_notification::Notifier;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::stats::CollectionStats;

/// 기본 실패율 임계치 (이 비율을 초과하면 긴급 알림)
pub const DEFAULT_ESCALATION_THRESHOLD: f64 = 0.5;

/// 알림에 포함할 에러 샘플 수
const ESCALATION_SAMPLE_SIZE: usize = 3;

/// 항목 처리 에러.
///
/// 취소로 중단된 항목은 실패로 세지 않고 따로 집계합니다.
pub trait BatchItemError: Display {
    /// 취소로 중단되었는지 여부
    fn is_cancelled(&self) -> bool;
}

impl BatchItemError for String {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// 항목별 실패 기록.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub key: String,
    pub error: String,
}

/// 배치 실행 결과.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// 중복 제거 후 항목 수
    pub total: usize,
    /// 성공한 키
    pub succeeded: Vec<String>,
    /// 실패한 키와 에러
    pub failed: Vec<ItemFailure>,
    /// 실행 중 취소된 키
    pub cancelled: Vec<String>,
    /// 취소로 실행되지 않은 항목 수
    pub not_dispatched: usize,
    /// 긴급 알림 발송 여부
    pub escalated: bool,
    /// 소요 시간
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// 실행 중 취소되었거나 배정되지 않은 항목 수
    pub fn skipped_count(&self) -> usize {
        self.cancelled.len() + self.not_dispatched
    }

    /// 실패율이 임계치를 초과하는지 확인합니다. 취소된 항목은 실패가 아닙니다.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.total > 0 && self.failure_count() as f64 > self.total as f64 * threshold
    }

    /// 수집 통계로 변환합니다.
    pub fn to_stats(&self) -> CollectionStats {
        CollectionStats {
            total: self.total,
            success: self.success_count(),
            errors: self.failure_count(),
            skipped: self.skipped_count(),
            elapsed: self.elapsed,
        }
    }
}

/// 워커 하나의 처리 결과
#[derive(Default)]
struct WorkerReport {
    succeeded: Vec<String>,
    failed: Vec<ItemFailure>,
    cancelled: Vec<String>,
}

/// 동시성 제한 배치 실행기.
///
/// # Example
///
/// ```ignore
/// let executor = BatchExecutor::new().with_escalation(notifier, 0.5);
/// let result = executor
///     .run("price_collect", tickers, 4, &shutdown, |ticker, cancel| async move {
///         client.fetch_one(&ticker, &cancel).await.map(|_| ())
///     })
///     .await;
/// ```
#[derive(Clone)]
pub struct BatchExecutor {
    notifier: Option<Arc<Notifier>>,
    escalation_threshold: f64,
    pacing: Duration,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self {
            notifier: None,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            pacing: Duration::ZERO,
        }
    }
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 실패율 초과 시 긴급 알림을 보낼 알림 관리자와 임계치를 설정합니다.
    pub fn with_escalation(mut self, notifier: Arc<Notifier>, threshold: f64) -> Self {
        self.notifier = Some(notifier);
        self.escalation_threshold = threshold;
        self
    }

    /// 워커별 항목 간 대기 시간을 설정합니다 (동시성 1이면 순차 수집 모드).
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// 키 목록을 최대 `max_concurrency`개씩 동시에 처리합니다.
    ///
    /// 키는 처음 등장 순서를 유지한 채 중복 제거됩니다. 취소되면 새 항목 배정을
    /// 멈추고 진행 중인 항목이 끝나기를 기다린 뒤 반환합니다.
    pub async fn run<I, F, Fut, E>(
        &self,
        task: &str,
        keys: I,
        max_concurrency: usize,
        cancel: &CancellationToken,
        per_item: F,
    ) -> BatchResult
    where
        I: IntoIterator<Item = String>,
        F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: BatchItemError + Send + 'static,
    {
        let start = Instant::now();
        let keys = dedupe(keys);
        let total = keys.len();

        if total == 0 {
            debug!(task = task, "처리할 항목 없음");
            return BatchResult::default();
        }

        let max_concurrency = if max_concurrency == 0 {
            warn!(task = task, "max_concurrency가 0이므로 1로 처리");
            1
        } else {
            max_concurrency
        };
        let workers = max_concurrency.min(total);

        info!(task = task, total = total, workers = workers, "배치 실행 시작");

        let queue = Arc::new(Mutex::new(keys.into_iter().collect::<VecDeque<_>>()));
        let per_item = Arc::new(per_item);
        let mut join_set = JoinSet::new();

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let per_item = Arc::clone(&per_item);
            let cancel = cancel.clone();
            let pacing = self.pacing;
            join_set.spawn(async move { worker(queue, per_item, cancel, pacing).await });
        }

        let mut result = BatchResult {
            total,
            ..Default::default()
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => {
                    result.succeeded.extend(report.succeeded);
                    result.failed.extend(report.failed);
                    result.cancelled.extend(report.cancelled);
                }
                Err(e) => error!(task = task, error = %e, "워커 태스크 비정상 종료"),
            }
        }

        result.not_dispatched = lock_queue(&queue).len();
        result.elapsed = start.elapsed();

        if result.skipped_count() > 0 {
            warn!(
                task = task,
                cancelled = result.cancelled.len(),
                not_dispatched = result.not_dispatched,
                "취소로 일부 항목 미실행"
            );
        }

        if result.exceeds(self.escalation_threshold) {
            result.escalated = self.escalate(task, &result).await;
        }

        result.to_stats().log_summary(task);
        result
    }

    async fn escalate(&self, task: &str, result: &BatchResult) -> bool {
        warn!(
            task = task,
            failed = result.failure_count(),
            total = result.total,
            threshold = self.escalation_threshold,
            "실패율 임계치 초과"
        );

        let Some(notifier) = &self.notifier else {
            return false;
        };

        let sample = result
            .failed
            .iter()
            .take(ESCALATION_SAMPLE_SIZE)
            .map(|f| format!("{}: {}", f.key, f.error))
            .collect::<Vec<_>>()
            .join("\n");

        notifier
            .send_critical(
                "수집 실패율 임계치 초과",
                &format!("{}: {}/{} 실패", task, result.failure_count(), result.total),
                &sample,
            )
            .await;
        true
    }
}

async fn worker<F, Fut, E>(
    queue: Arc<Mutex<VecDeque<String>>>,
    per_item: Arc<F>,
    cancel: CancellationToken,
    pacing: Duration,
) -> WorkerReport
where
    F: Fn(String, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: BatchItemError + Send + 'static,
{
    let mut report = WorkerReport::default();
    let mut first = true;

    loop {
        if !first && !pacing.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pacing) => {}
            }
        }
        first = false;

        if cancel.is_cancelled() {
            break;
        }
        let Some(key) = lock_queue(&queue).pop_front() else {
            break;
        };

        let outcome = AssertUnwindSafe(per_item(key.clone(), cancel.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => report.succeeded.push(key),
            Ok(Err(e)) if e.is_cancelled() => {
                debug!(key = %key, "항목 처리 취소");
                report.cancelled.push(key);
            }
            Ok(Err(e)) => {
                debug!(key = %key, error = %e, "항목 처리 실패");
                report.failed.push(ItemFailure {
                    key,
                    error: e.to_string(),
                });
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(key = %key, panic = %message, "항목 처리 중 panic");
                report.failed.push(ItemFailure {
                    key,
                    error: format!("panicked: {message}"),
                });
            }
        }
    }

    report
}

fn dedupe<I: IntoIterator<Item = String>>(keys: I) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

fn lock_queue(queue: &Mutex<VecDeque<String>>) -> std::sync::MutexGuard<'_, VecDeque<String>> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_preserves_first_seen_order() {
        let keys = ["b", "a", "b", "c", "a"].map(String::from);
        assert_eq!(dedupe(keys), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_exceeds_is_strict() {
        let mut result = BatchResult {
            total: 10,
            ..Default::default()
        };
        result.failed = (0..5)
            .map(|i| ItemFailure {
                key: i.to_string(),
                error: "x".into(),
            })
            .collect();
        assert!(!result.exceeds(0.5));

        result.failed.push(ItemFailure {
            key: "5".into(),
            error: "x".into(),
        });
        assert!(result.exceeds(0.5));
    }

    #[tokio::test]
    async fn test_empty_input_returns_zero_counts() {
        let result = BatchExecutor::new()
            .run(
                "empty",
                Vec::<String>::new(),
                4,
                &CancellationToken::new(),
                |_key, _cancel| async { Ok::<(), String>(()) },
            )
            .await;

        assert_eq!(result.total, 0);
        assert_eq!(result.success_count(), 0);
        assert_eq!(result.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let keys = ["ok", "boom", "ok2"].map(String::from);
        let result = BatchExecutor::new()
            .run("panic", keys, 2, &CancellationToken::new(), |key, _cancel| async move {
                if key == "boom" {
                    panic!("bad item");
                }
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failed[0].key, "boom");
        assert!(result.failed[0].error.contains("bad item"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let keys = (0..5).map(|i| i.to_string());
        let result = BatchExecutor::new()
            .run("cancelled", keys, 2, &cancel, |_key, _cancel| async {
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(result.total, 5);
        assert_eq!(result.success_count(), 0);
        assert_eq!(result.not_dispatched, 5);
    }

    struct Interrupted;

    impl Display for Interrupted {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "interrupted")
        }
    }

    impl BatchItemError for Interrupted {
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_escalating_run_future_is_send() {
        let executor = BatchExecutor::new().with_escalation(Arc::new(Notifier::new()), 0.5);
        let cancel = CancellationToken::new();
        let run = executor.run("send", Vec::<String>::new(), 1, &cancel, |_key, _cancel| async {
            Ok::<(), String>(())
        });
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_cancelled_items_do_not_count_as_failures() {
        let keys = (0..4).map(|i| i.to_string());
        let result = BatchExecutor::new()
            .with_escalation(Arc::new(Notifier::new()), 0.5)
            .run("interrupted", keys, 2, &CancellationToken::new(), |_key, _cancel| async {
                Err::<(), _>(Interrupted)
            })
            .await;

        assert_eq!(result.cancelled.len(), 4);
        assert_eq!(result.failure_count(), 0);
        assert_eq!(result.skipped_count(), 4);
        assert!(!result.escalated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_spaces_items_on_single_worker() {
        let keys = (0..3).map(|i| i.to_string());
        let start = tokio::time::Instant::now();

        let result = BatchExecutor::new()
            .with_pacing(Duration::from_millis(500))
            .run("paced", keys, 1, &CancellationToken::new(), |_key, _cancel| async {
                Ok::<(), String>(())
            })
            .await;

        assert_eq!(result.success_count(), 3);
        assert!(start.elapsed() >= Duration::from_millis(1_000));
    }
}
