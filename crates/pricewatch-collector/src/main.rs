//! PriceWatch collector CLI.

use std::time::Duration;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use pricewatch_core::logging::{init_logging, LogConfig};
use pricewatch_collector::jobs::{COLLECT_TASK, REPORT_TASK};
use pricewatch_collector::scheduler::JobHandler;
use pricewatch_collector::storage::JobRunRepository;
use pricewatch_collector::{App, CollectorConfig};

/// 종료 시 진행 중인 작업 대기 한도
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "pricewatch-collector")]
#[command(about = "Rate-limited price collector with market-hours scheduling", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error). 없으면 RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// DATABASE_URL을 무시하고 인메모리 저장소 사용
    #[arg(long, global = true)]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 데몬 모드: 스케줄러 실행 (Ctrl-C로 종료)
    Daemon,

    /// 시세 수집 1회 실행
    Collect {
        /// 특정 종목만 수집 (쉼표로 구분, 예: "7203.T,6758.T")
        #[arg(long)]
        tickers: Option<String>,
    },

    /// 포트폴리오 리포트 1회 전송
    Report,

    /// 최근 작업 실행 기록 조회
    Runs {
        /// 조회 개수
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 로깅 초기화
    // --log-level이 RUST_LOG보다 우선
    let mut log_config = LogConfig::from_env();
    if let Some(level) = &cli.log_level {
        log_config = log_config.with_level(level.clone());
    }
    init_logging(log_config).map_err(|e| anyhow!(e))?;

    tracing::info!("PriceWatch Collector 시작");

    // 설정 로드
    let config = CollectorConfig::from_env()?;
    tracing::debug!(
        tickers = ?config.tickers,
        positions = config.positions.len(),
        "설정 로드 완료"
    );

    let app = App::connect(config, cli.memory).await?;

    match cli.command {
        Commands::Daemon => run_daemon(&app).await?,
        Commands::Collect { tickers } => {
            let tickers = tickers.map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });
            let job = app.collection_job(tickers);
            let outcome = app.job_logger.execute(COLLECT_TASK, || job.run()).await;
            if let Some(error) = outcome.error {
                return Err(anyhow!(error));
            }
        }
        Commands::Report => {
            let job = app.report_job();
            let outcome = app.job_logger.execute(REPORT_TASK, || job.run()).await;
            if let Some(error) = outcome.error {
                return Err(anyhow!(error));
            }
        }
        Commands::Runs { limit } => {
            let runs = app.runs.recent_runs(limit).await?;
            println!(
                "{:<36}  {:<18}  {:<9}  {:<20}  {:>9}  ERROR",
                "ID", "TASK", "STATUS", "STARTED (UTC)", "MS"
            );
            for run in runs {
                println!(
                    "{:<36}  {:<18}  {:<9}  {:<20}  {:>9}  {}",
                    run.id,
                    run.task_name,
                    run.status.as_str(),
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.duration_ms,
                    run.error.unwrap_or_default()
                );
            }
        }
    }

    tracing::info!("PriceWatch Collector 종료");
    Ok(())
}

async fn run_daemon(app: &App) -> anyhow::Result<()> {
    let scheduler = app.scheduler()?;

    tracing::info!(
        interval_minutes = app.config.schedule.collect_interval_minutes,
        tickers = app.config.tickers.len(),
        "=== 데몬 모드 시작 ==="
    );
    scheduler.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("종료 신호 수신, 데몬 종료 중...");

    // 진행 중인 수집의 신규 배정 중단
    app.shutdown.cancel();
    scheduler.stop_and_drain(DRAIN_TIMEOUT).await?;

    Ok(())
}
