//! 인메모리 저장소.
//!
//! DATABASE_URL 없이 실행하거나 테스트할 때 사용합니다.
//! 장애 주입으로 저장 실패 경로를 재현할 수 있습니다.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pricewatch_core::{JobRun, JobStatus, Quote};
use uuid::Uuid;

use super::{duration_ms, JobRunRepository, PriceRepository, StorageError};

/// 인메모리 저장소.
#[derive(Default)]
pub struct MemoryStore {
    quotes: RwLock<HashMap<String, Vec<Quote>>>,
    runs: RwLock<Vec<JobRun>>,
    failing_tickers: RwLock<HashSet<String>>,
    fail_run_creation: AtomicBool,
    fail_run_updates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 해당 종목의 시세 저장을 실패시킵니다.
    pub fn fail_saves_for(&self, ticker: impl Into<String>) {
        write(&self.failing_tickers).insert(ticker.into());
    }

    /// `create_run` 실패 여부를 설정합니다.
    pub fn set_fail_run_creation(&self, fail: bool) {
        self.fail_run_creation.store(fail, Ordering::SeqCst);
    }

    /// `complete_run`/`fail_run` 실패 여부를 설정합니다.
    pub fn set_fail_run_updates(&self, fail: bool) {
        self.fail_run_updates.store(fail, Ordering::SeqCst);
    }

    /// 종목별 저장된 시세 수
    pub fn quote_count(&self, ticker: &str) -> usize {
        read(&self.quotes).get(ticker).map_or(0, Vec::len)
    }

    /// 전체 실행 기록 (생성 순)
    pub fn runs(&self) -> Vec<JobRun> {
        read(&self.runs).clone()
    }

    fn finish_run(
        &self,
        run_id: Uuid,
        status: JobStatus,
        duration: Duration,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        if self.fail_run_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("run updates disabled".into()));
        }

        let mut runs = write(&self.runs);
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == JobStatus::Running)
            .ok_or(StorageError::RunNotRunning(run_id))?;

        run.status = status;
        run.completed_at = Some(Utc::now());
        run.duration_ms = duration_ms(duration);
        run.error = error.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl PriceRepository for MemoryStore {
    async fn save_quote(&self, quote: &Quote) -> Result<(), StorageError> {
        if read(&self.failing_tickers).contains(&quote.ticker) {
            return Err(StorageError::Unavailable(format!(
                "save disabled for {}",
                quote.ticker
            )));
        }
        write(&self.quotes)
            .entry(quote.ticker.clone())
            .or_default()
            .push(quote.clone());
        Ok(())
    }

    async fn save_quotes(&self, quotes: &[Quote]) -> Result<usize, StorageError> {
        {
            let failing = read(&self.failing_tickers);
            if let Some(q) = quotes.iter().find(|q| failing.contains(&q.ticker)) {
                return Err(StorageError::Unavailable(format!(
                    "save disabled for {}",
                    q.ticker
                )));
            }
        }

        let mut store = write(&self.quotes);
        for quote in quotes {
            store
                .entry(quote.ticker.clone())
                .or_default()
                .push(quote.clone());
        }
        Ok(quotes.len())
    }

    async fn latest_quote(&self, ticker: &str) -> Result<Option<Quote>, StorageError> {
        Ok(read(&self.quotes)
            .get(ticker)
            .and_then(|quotes| quotes.iter().max_by_key(|q| q.fetched_at))
            .cloned())
    }
}

#[async_trait]
impl JobRunRepository for MemoryStore {
    async fn create_run(&self, task_name: &str) -> Result<Uuid, StorageError> {
        if self.fail_run_creation.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("run creation disabled".into()));
        }
        let run = JobRun::start(task_name);
        let id = run.id;
        write(&self.runs).push(run);
        Ok(id)
    }

    async fn complete_run(&self, run_id: Uuid, duration: Duration) -> Result<(), StorageError> {
        self.finish_run(run_id, JobStatus::Completed, duration, None)
    }

    async fn fail_run(
        &self,
        run_id: Uuid,
        duration: Duration,
        error: &str,
    ) -> Result<(), StorageError> {
        self.finish_run(run_id, JobStatus::Failed, duration, Some(error))
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<JobRun>, StorageError> {
        let mut runs = read(&self.runs).clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn prune_runs(&self, older_than: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut runs = write(&self.runs);
        let before = runs.len();
        runs.retain(|r| r.started_at >= older_than || !r.status.is_terminal());
        Ok((before - runs.len()) as u64)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
