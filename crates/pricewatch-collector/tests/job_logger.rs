//! 작업 실행 기록기 통합 테스트.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pricewatch_collector::job_logger::JobExecutionLogger;
use pricewatch_collector::storage::{JobRunRepository, MemoryStore};
use pricewatch_collector::CollectorError;
use pricewatch_core::JobStatus;

fn logger() -> (Arc<MemoryStore>, JobExecutionLogger) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), JobExecutionLogger::new(store))
}

#[tokio::test]
async fn test_success_records_completed_run() {
    let (store, logger) = logger();

    let outcome = logger
        .execute("price_collect", || async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        })
        .await;

    assert!(outcome.is_success());
    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(Some(runs[0].id), outcome.run_id);
    assert_eq!(runs[0].task_name, "price_collect");
    assert_eq!(runs[0].status, JobStatus::Completed);
    assert!(runs[0].duration_ms >= 0);
    assert!(runs[0].completed_at.is_some());
    assert!(runs[0].error.is_none());
}

#[tokio::test]
async fn test_error_records_failed_run_with_text() {
    let (store, logger) = logger();

    let outcome = logger
        .execute("portfolio_report", || async {
            Err(CollectorError::Job("quote source down".into()))
        })
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    let runs = store.runs();
    assert_eq!(runs[0].status, JobStatus::Failed);
    assert_eq!(runs[0].error.as_deref(), Some("Job failed: quote source down"));
}

#[tokio::test]
async fn test_job_still_runs_when_run_creation_fails() {
    let (store, logger) = logger();
    store.set_fail_run_creation(true);
    let ran = Arc::new(AtomicBool::new(false));

    let outcome = {
        let ran = Arc::clone(&ran);
        logger
            .execute("price_collect", || async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
    };

    assert!(ran.load(Ordering::SeqCst));
    assert!(outcome.run_id.is_none());
    assert!(outcome.is_success());
    assert!(store.runs().is_empty());
}

#[tokio::test]
async fn test_panic_is_recorded_as_failure() {
    let (store, logger) = logger();

    let outcome = logger
        .execute("price_collect", || async {
            if store.runs().len() == 1 {
                panic!("handler bug");
            }
            Ok(())
        })
        .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(store.runs()[0].status, JobStatus::Failed);
    assert_eq!(store.runs()[0].error.as_deref(), Some("job panicked"));
}

#[tokio::test]
async fn test_update_failure_does_not_change_outcome() {
    let (store, logger) = logger();
    store.set_fail_run_updates(true);

    let outcome = logger.execute("job_run_prune", || async { Ok(()) }).await;

    assert!(outcome.is_success());
    let runs = store.recent_runs(10).await.unwrap();
    assert_eq!(runs[0].status, JobStatus::Running);
}
