//! 스케줄 작업 구현.
//!
//! - [`PriceCollectionJob`]: 종목 시세 수집 및 저장
//! - [`PortfolioReportJob`]: 보유 종목 평가 리포트 알림
//! - [`RunPruneJob`]: 오래된 실행 기록 정리

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pricewatch_core::Position;
use pricewatch_notification::{NotificationEvent, NotificationPriority, Notifier, ReportLine};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::executor::{BatchExecutor, BatchItemError, BatchResult};
use crate::fetch::{FetchClient, FetchError};
use crate::scheduler::JobHandler;
use crate::storage::{JobRunRepository, PriceRepository, StorageError};
use crate::{CollectorError, Result};

/// 작업 이름
pub const COLLECT_TASK: &str = "price_collect";
pub const REPORT_TASK: &str = "portfolio_report";
pub const PRUNE_TASK: &str = "job_run_prune";

/// 종목 하나의 수집 실패 사유
#[derive(Debug, thiserror::Error)]
enum ItemError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("save failed: {0}")]
    Storage(#[from] StorageError),
}

impl BatchItemError for ItemError {
    fn is_cancelled(&self) -> bool {
        match self {
            Self::Fetch(e) => BatchItemError::is_cancelled(e),
            Self::Storage(_) => false,
        }
    }
}

/// 시세 수집 작업.
///
/// 종목별로 조회 후 즉시 저장합니다. 일부 종목 실패는 작업 실패가 아니며,
/// 하나도 성공하지 못한 경우에만 에러를 반환합니다.
pub struct PriceCollectionJob {
    tickers: Vec<String>,
    client: Arc<FetchClient>,
    prices: Arc<dyn PriceRepository>,
    executor: BatchExecutor,
    max_concurrency: usize,
    shutdown: CancellationToken,
}

impl PriceCollectionJob {
    pub fn new(
        tickers: Vec<String>,
        client: Arc<FetchClient>,
        prices: Arc<dyn PriceRepository>,
        executor: BatchExecutor,
        max_concurrency: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tickers,
            client,
            prices,
            executor,
            max_concurrency,
            shutdown,
        }
    }

    /// 배치 수집을 실행하고 결과를 반환합니다.
    pub async fn collect(&self) -> BatchResult {
        let client = Arc::clone(&self.client);
        let prices = Arc::clone(&self.prices);

        self.executor
            .run(
                COLLECT_TASK,
                self.tickers.clone(),
                self.max_concurrency,
                &self.shutdown,
                move |ticker, cancel| {
                    let client = Arc::clone(&client);
                    let prices = Arc::clone(&prices);
                    async move {
                        let quote = client.fetch_one(&ticker, &cancel).await?;
                        prices.save_quote(&quote).await?;
                        Ok::<(), ItemError>(())
                    }
                },
            )
            .await
    }
}

#[async_trait]
impl JobHandler for PriceCollectionJob {
    async fn run(&self) -> Result<()> {
        let result = self.collect().await;

        if !result.cancelled.is_empty() {
            warn!(
                cancelled = result.cancelled.len(),
                "종료 신호로 일부 종목 수집 중단"
            );
        }

        // 취소된 종목은 실패로 보지 않음
        if result.success_count() == 0 && result.failure_count() > 0 {
            let first = &result.failed[0];
            return Err(CollectorError::Job(format!(
                "{}개 종목 모두 실패 (예: {}: {})",
                result.failure_count(),
                first.key,
                first.error
            )));
        }
        Ok(())
    }
}

/// 포트폴리오 리포트 작업.
pub struct PortfolioReportJob {
    positions: Vec<Position>,
    prices: Arc<dyn PriceRepository>,
    notifier: Arc<Notifier>,
}

impl PortfolioReportJob {
    pub fn new(
        positions: Vec<Position>,
        prices: Arc<dyn PriceRepository>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            positions,
            prices,
            notifier,
        }
    }

    /// 최신 시세로 리포트를 만듭니다. 시세가 없는 종목은 `missing`에 모읍니다.
    pub async fn build_report(&self) -> Result<NotificationEvent> {
        let mut lines = Vec::with_capacity(self.positions.len());
        let mut missing = Vec::new();

        for position in &self.positions {
            match self.prices.latest_quote(&position.ticker).await? {
                Some(quote) => lines.push(ReportLine {
                    ticker: position.ticker.clone(),
                    price: quote.price,
                    change_percent: quote.change_percent(),
                    quantity: position.quantity,
                    market_value: position.market_value(quote.price),
                    unrealized_pnl: position.unrealized_pnl(quote.price),
                }),
                None => missing.push(position.ticker.clone()),
            }
        }

        let total_value: Decimal = lines.iter().map(|l| l.market_value).sum();
        let total_pnl: Decimal = lines.iter().map(|l| l.unrealized_pnl).sum();

        Ok(NotificationEvent::PortfolioReport {
            lines,
            total_value,
            total_pnl,
            missing,
        })
    }
}

#[async_trait]
impl JobHandler for PortfolioReportJob {
    async fn run(&self) -> Result<()> {
        if self.positions.is_empty() {
            info!("보유 종목 없음, 리포트 생략");
            return Ok(());
        }

        let report = self.build_report().await?;
        if let NotificationEvent::PortfolioReport { missing, .. } = &report {
            if !missing.is_empty() {
                warn!(missing = ?missing, "시세 없는 보유 종목");
            }
        }

        self.notifier
            .notify(report, NotificationPriority::Normal)
            .await;
        Ok(())
    }
}

/// 실행 기록 정리 작업.
pub struct RunPruneJob {
    runs: Arc<dyn JobRunRepository>,
    retention: chrono::Duration,
}

impl RunPruneJob {
    pub fn new(runs: Arc<dyn JobRunRepository>, retention: chrono::Duration) -> Self {
        Self { runs, retention }
    }
}

#[async_trait]
impl JobHandler for RunPruneJob {
    async fn run(&self) -> Result<()> {
        let cutoff = Utc::now() - self.retention;
        let removed = self.runs.prune_runs(cutoff).await?;
        info!(removed = removed, cutoff = %cutoff, "실행 기록 정리 완료");
        Ok(())
    }
}
