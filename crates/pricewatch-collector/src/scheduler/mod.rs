//! 작업 스케줄러.
//!
//! `Stopped --start--> Running --stop--> Stopped` 두 상태만 가집니다.
//! 실행 중에는 스케줄 정의마다 독립 타이머 태스크가 돌며,
//! 각 실행은 별도 태스크로 띄워 [`JobExecutionLogger`]로 감쌉니다.
//!
//! - 고정 주기 트리거: 장 운영 시간에만 실행, 그 외에는 아무것도 하지 않음
//! - 시각 트리거 (매일/요일): 장 운영 여부와 무관하게 시장 현지 시각 기준 실행
//! - 같은 작업의 이전 실행이 끝나지 않았으면 이번 실행은 건너뜀
//!
//! `stop()`은 이후 실행만 멈추고 진행 중인 실행은 끝까지 둡니다.

mod market_hours;
mod schedule;

pub(crate) use market_hours::hm;
pub use market_hours::{
    MarketHours, DEFAULT_AFTERNOON_OPEN, DEFAULT_CLOSE, DEFAULT_MORNING_CLOSE, DEFAULT_OPEN,
};
pub use schedule::{JobHandler, ScheduleDefinition, Trigger};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::job_logger::JobExecutionLogger;

/// 현재 시각 공급자 (테스트에서 고정 시각 주입).
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 스케줄러 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("invalid schedule for {task}: {reason}")]
    InvalidSchedule { task: String, reason: String },

    #[error("invalid market hours: {0}")]
    InvalidMarketHours(String),
}

/// 스케줄러 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct RunningTimers {
    shutdown: CancellationToken,
    timers: Vec<JoinHandle<()>>,
}

/// 작업 스케줄러.
pub struct Scheduler {
    definitions: Vec<ScheduleDefinition>,
    /// 작업별 실행 중 표시 (재시작해도 유지)
    in_flight: HashMap<String, Arc<AtomicBool>>,
    market_hours: Arc<MarketHours>,
    job_logger: JobExecutionLogger,
    clock: Clock,
    firings: TaskTracker,
    running: Mutex<Option<RunningTimers>>,
}

impl Scheduler {
    pub fn new(market_hours: MarketHours, job_logger: JobExecutionLogger) -> Self {
        Self {
            definitions: Vec::new(),
            in_flight: HashMap::new(),
            market_hours: Arc::new(market_hours),
            job_logger,
            clock: Arc::new(Utc::now),
            firings: TaskTracker::new(),
            running: Mutex::new(None),
        }
    }

    /// 시각 공급자를 교체합니다.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// 스케줄을 등록합니다.
    pub fn register(&mut self, definition: ScheduleDefinition) -> Result<(), SchedulerError> {
        let invalid = |reason: &str| SchedulerError::InvalidSchedule {
            task: definition.task_name.clone(),
            reason: reason.to_string(),
        };

        match &definition.trigger {
            Trigger::Interval(period) if period.is_zero() => {
                return Err(invalid("interval must be positive"))
            }
            Trigger::Weekly { weekdays, .. } if weekdays.is_empty() => {
                return Err(invalid("weekday set is empty"))
            }
            _ => {}
        }

        if self
            .definitions
            .iter()
            .any(|d| d.task_name == definition.task_name)
        {
            return Err(SchedulerError::DuplicateTask(definition.task_name));
        }

        self.in_flight
            .insert(definition.task_name.clone(), Arc::default());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        if self.lock_running().is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// 진행 중인 실행 수
    pub fn in_flight(&self) -> usize {
        self.firings.len()
    }

    /// 타이머를 시작합니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let shutdown = CancellationToken::new();
        let timers = self
            .definitions
            .iter()
            .map(|definition| {
                let timer = Timer {
                    definition: definition.clone(),
                    market_hours: Arc::clone(&self.market_hours),
                    job_logger: self.job_logger.clone(),
                    clock: Arc::clone(&self.clock),
                    firings: self.firings.clone(),
                    in_flight: self
                        .in_flight
                        .get(&definition.task_name)
                        .cloned()
                        .unwrap_or_default(),
                    shutdown: shutdown.clone(),
                };
                info!(
                    task = %definition.task_name,
                    trigger = %definition.trigger,
                    "스케줄 등록"
                );
                tokio::spawn(timer.run())
            })
            .collect();

        *running = Some(RunningTimers { shutdown, timers });
        info!(schedules = self.definitions.len(), "스케줄러 시작");
        Ok(())
    }

    /// 이후 실행을 멈춥니다. 진행 중인 실행은 계속됩니다.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        let stopped = self.lock_running().take().ok_or(SchedulerError::NotRunning)?;
        stopped.shutdown.cancel();
        drop(stopped.timers);

        info!(in_flight = self.firings.len(), "스케줄러 중지");
        Ok(())
    }

    /// 중지 후 진행 중인 실행이 끝나기를 최대 `timeout`만큼 기다립니다.
    ///
    /// 모두 끝났으면 `true`.
    pub async fn stop_and_drain(&self, timeout: Duration) -> Result<bool, SchedulerError> {
        self.stop()?;

        self.firings.close();
        let drained = tokio::time::timeout(timeout, self.firings.wait())
            .await
            .is_ok();
        self.firings.reopen();

        if drained {
            info!("진행 중인 작업 정리 완료");
        } else {
            warn!(in_flight = self.firings.len(), "작업 정리 시간 초과");
        }
        Ok(drained)
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningTimers>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.shutdown.cancel();
        }
    }
}

/// 스케줄 하나의 타이머 태스크.
struct Timer {
    definition: ScheduleDefinition,
    market_hours: Arc<MarketHours>,
    job_logger: JobExecutionLogger,
    clock: Clock,
    firings: TaskTracker,
    in_flight: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl Timer {
    async fn run(self) {
        match self.definition.trigger.clone() {
            Trigger::Interval(period) => self.run_interval(period).await,
            Trigger::Daily(_) | Trigger::Weekly { .. } => self.run_wall_clock().await,
        }
        debug!(task = %self.definition.task_name, "타이머 종료");
    }

    async fn run_interval(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = (self.clock)();
                    let gated = self.definition.trigger.is_market_gated();
                    if gated && !self.market_hours.is_open(&now) {
                        debug!(task = %self.definition.task_name, "장 운영 시간 외, 실행 건너뜀");
                        continue;
                    }
                    self.fire();
                }
            }
        }
    }

    async fn run_wall_clock(&self) {
        let tz = self.market_hours.timezone;
        let mut after = (self.clock)();

        loop {
            let now = (self.clock)();
            if now > after {
                after = now;
            }

            let Some(next) = self
                .definition
                .trigger
                .next_fire_after(&after.with_timezone(&tz))
            else {
                warn!(task = %self.definition.task_name, "다음 실행 시각 없음, 타이머 종료");
                break;
            };
            let next = next.with_timezone(&Utc);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            debug!(
                task = %self.definition.task_name,
                next = %next.with_timezone(&tz),
                "다음 실행 예약"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    self.fire();
                    after = next;
                }
            }
        }
    }

    fn fire(&self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(
                task = %self.definition.task_name,
                "이전 실행이 아직 진행 중, 이번 실행 건너뜀"
            );
            return;
        }

        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let definition = self.definition.clone();
        let job_logger = self.job_logger.clone();

        self.firings.spawn(async move {
            let _guard = guard;
            let handler = Arc::clone(&definition.handler);
            job_logger
                .execute(&definition.task_name, || handler.run())
                .await;
        });
    }
}

/// 실행 종료(panic 포함) 시 진행 중 표시를 해제합니다.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

