//! 스케줄 정의와 트리거.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, NaiveTime, TimeZone, Weekday};

use crate::Result;

/// 스케줄이 실행하는 작업.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// 실행 트리거.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// 고정 주기 (장 운영 시간에만 실행)
    Interval(Duration),
    /// 매일 지정 시각
    Daily(NaiveTime),
    /// 지정 요일의 지정 시각
    Weekly {
        weekdays: Vec<Weekday>,
        time: NaiveTime,
    },
}

impl Trigger {
    /// 장 운영 시간 조건이 적용되는지 여부.
    pub fn is_market_gated(&self) -> bool {
        matches!(self, Self::Interval(_))
    }

    /// `after` 이후(초과) 첫 실행 시각을 계산합니다.
    ///
    /// 고정 주기 트리거나 요일이 비어 있으면 `None`.
    /// DST로 존재하지 않는 현지 시각은 건너뜁니다.
    pub fn next_fire_after<Z: TimeZone>(&self, after: &DateTime<Z>) -> Option<DateTime<Z>> {
        let (time, weekdays): (NaiveTime, Option<&[Weekday]>) = match self {
            Self::Interval(_) => return None,
            Self::Daily(time) => (*time, None),
            Self::Weekly { weekdays, time } => {
                if weekdays.is_empty() {
                    return None;
                }
                (*time, Some(weekdays.as_slice()))
            }
        };

        let tz = after.timezone();
        let start = after.date_naive();

        (0..=8u64).find_map(|offset| {
            let date = start.checked_add_days(Days::new(offset))?;
            if let Some(days) = weekdays {
                if !days.contains(&date.weekday()) {
                    return None;
                }
            }
            let candidate = tz.from_local_datetime(&date.and_time(time)).earliest()?;
            (candidate > *after).then_some(candidate)
        })
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(period) => write!(f, "every {}s", period.as_secs()),
            Self::Daily(time) => write!(f, "daily {}", time.format("%H:%M")),
            Self::Weekly { weekdays, time } => {
                let days = weekdays
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "{} {}", days, time.format("%H:%M"))
            }
        }
    }
}

/// 스케줄 정의.
#[derive(Clone)]
pub struct ScheduleDefinition {
    pub task_name: String,
    pub trigger: Trigger,
    pub handler: Arc<dyn JobHandler>,
}

impl ScheduleDefinition {
    pub fn new(
        task_name: impl Into<String>,
        trigger: Trigger,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            trigger,
            handler,
        }
    }
}

impl fmt::Debug for ScheduleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleDefinition")
            .field("task_name", &self.task_name)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}
