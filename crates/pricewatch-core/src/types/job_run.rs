//! 스케줄 작업 실행 기록.
//!
//! 하나의 실행은 `running` 상태로 생성되고 정확히 한 번 `completed` 또는
//! `failed`로 전이된 뒤에는 변경되지 않습니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ParseError;

/// 작업 실행 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 실행 중
    Running,
    /// 정상 완료
    Completed,
    /// 실패
    Failed,
}

impl JobStatus {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseError::UnknownJobStatus(other.to_string())),
        }
    }
}

/// 작업 실행 기록.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    /// 실행 ID
    pub id: Uuid,
    /// 작업 이름
    pub task_name: String,
    /// 현재 상태
    pub status: JobStatus,
    /// 시작 시각
    pub started_at: DateTime<Utc>,
    /// 종료 시각 (실행 중이면 None)
    pub completed_at: Option<DateTime<Utc>>,
    /// 소요 시간 (밀리초)
    pub duration_ms: i64,
    /// 실패 사유
    pub error: Option<String>,
}

impl JobRun {
    /// `running` 상태의 새 실행 기록을 생성합니다.
    pub fn start(task_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_name: task_name.into(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip_strings() {
        for status in [JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_run_start() {
        let run = JobRun::start("collect_prices");
        assert_eq!(run.status, JobStatus::Running);
        assert!(!run.status.is_terminal());
        assert!(run.completed_at.is_none());
        assert!(run.error.is_none());
    }
}
