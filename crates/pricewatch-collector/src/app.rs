//! 구성 요소 조립.
//!
//! 설정에서 저장소, 알림, 조회 클라이언트, 실행기, 스케줄러를 만들어
//! 생성자 주입으로 연결합니다.

use std::sync::Arc;

use pricewatch_notification::{Notifier, TelegramConfig, TelegramSender};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::executor::BatchExecutor;
use crate::fetch::{FetchClient, HttpQuoteFetcher, QuoteFetcher};
use crate::job_logger::JobExecutionLogger;
use crate::jobs::{
    PortfolioReportJob, PriceCollectionJob, RunPruneJob, COLLECT_TASK, PRUNE_TASK, REPORT_TASK,
};
use crate::rate_limit::RateLimiter;
use crate::scheduler::{ScheduleDefinition, Scheduler, Trigger};
use crate::storage::{JobRunRepository, MemoryStore, PgStore, PriceRepository};
use crate::Result;

/// 조립된 애플리케이션.
pub struct App {
    pub config: CollectorConfig,
    pub prices: Arc<dyn PriceRepository>,
    pub runs: Arc<dyn JobRunRepository>,
    pub notifier: Arc<Notifier>,
    pub fetch_client: Arc<FetchClient>,
    pub job_logger: JobExecutionLogger,
    pub shutdown: CancellationToken,
}

impl App {
    /// 설정으로 애플리케이션을 만듭니다.
    ///
    /// `DATABASE_URL`이 있고 `memory`가 false면 PostgreSQL, 아니면 인메모리 저장소를 씁니다.
    pub async fn connect(config: CollectorConfig, memory: bool) -> Result<Self> {
        let (prices, runs): (Arc<dyn PriceRepository>, Arc<dyn JobRunRepository>) =
            match config.database_url.as_deref().filter(|_| !memory) {
                Some(url) => {
                    info!("데이터베이스 연결 중...");
                    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
                    let store = Arc::new(PgStore::new(pool));
                    store.ensure_schema().await?;
                    info!("데이터베이스 연결 완료");
                    (store.clone() as Arc<dyn PriceRepository>, store as Arc<dyn JobRunRepository>)
                }
                None => {
                    warn!("인메모리 저장소 사용 (프로세스 종료 시 데이터 소실)");
                    let store = Arc::new(MemoryStore::new());
                    (store.clone() as Arc<dyn PriceRepository>, store as Arc<dyn JobRunRepository>)
                }
            };

        let notifier = match TelegramConfig::from_env() {
            Some(telegram) => Notifier::new().with_sender(Arc::new(TelegramSender::new(telegram)?)),
            None => {
                info!("텔레그램 설정 없음, 알림은 로그로만 기록");
                Notifier::new()
            }
        };

        let fetcher = HttpQuoteFetcher::new(
            config.fetch.endpoint.clone(),
            &config.fetch.user_agent,
            config.fetch.request_timeout(),
        )?;

        Ok(Self::from_parts(
            config,
            prices,
            runs,
            Arc::new(fetcher),
            Arc::new(notifier),
        ))
    }

    /// 구성 요소를 직접 주입해 만듭니다.
    pub fn from_parts(
        config: CollectorConfig,
        prices: Arc<dyn PriceRepository>,
        runs: Arc<dyn JobRunRepository>,
        fetcher: Arc<dyn QuoteFetcher>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.fetch.rate_limit()));
        let fetch_client = Arc::new(FetchClient::new(
            fetcher,
            limiter,
            config.fetch.retry_policy(),
            config.fetch.request_timeout(),
        ));
        let job_logger = JobExecutionLogger::new(Arc::clone(&runs));

        Self {
            config,
            prices,
            runs,
            notifier,
            fetch_client,
            job_logger,
            shutdown: CancellationToken::new(),
        }
    }

    /// 배치 실행기
    pub fn executor(&self) -> BatchExecutor {
        BatchExecutor::new()
            .with_escalation(
                Arc::clone(&self.notifier),
                self.config.collect.escalation_threshold,
            )
            .with_pacing(self.config.collect.pacing())
    }

    /// 시세 수집 작업. `tickers`가 없으면 설정의 종목을 씁니다.
    pub fn collection_job(&self, tickers: Option<Vec<String>>) -> PriceCollectionJob {
        PriceCollectionJob::new(
            tickers.unwrap_or_else(|| self.config.tickers.clone()),
            Arc::clone(&self.fetch_client),
            Arc::clone(&self.prices),
            self.executor(),
            self.config.collect.max_concurrency,
            self.shutdown.child_token(),
        )
    }

    pub fn report_job(&self) -> PortfolioReportJob {
        PortfolioReportJob::new(
            self.config.positions.clone(),
            Arc::clone(&self.prices),
            Arc::clone(&self.notifier),
        )
    }

    pub fn prune_job(&self) -> RunPruneJob {
        RunPruneJob::new(Arc::clone(&self.runs), self.config.schedule.run_retention())
    }

    /// 수집/리포트/정리 스케줄이 등록된 스케줄러.
    pub fn scheduler(&self) -> Result<Scheduler> {
        let schedule = &self.config.schedule;
        let mut scheduler =
            Scheduler::new(self.config.market_hours.clone(), self.job_logger.clone());

        scheduler.register(ScheduleDefinition::new(
            COLLECT_TASK,
            Trigger::Interval(schedule.collect_interval()),
            Arc::new(self.collection_job(None)),
        ))?;
        scheduler.register(ScheduleDefinition::new(
            REPORT_TASK,
            Trigger::Weekly {
                weekdays: schedule.report_weekdays.clone(),
                time: schedule.report_time,
            },
            Arc::new(self.report_job()),
        ))?;
        scheduler.register(ScheduleDefinition::new(
            PRUNE_TASK,
            Trigger::Daily(schedule.prune_time),
            Arc::new(self.prune_job()),
        ))?;

        Ok(scheduler)
    }
}
