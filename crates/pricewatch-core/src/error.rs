//! 도메인 타입 파싱 에러.

use thiserror::Error;

/// 도메인 값 파싱 실패.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// 알 수 없는 작업 상태 문자열
    #[error("알 수 없는 작업 상태: {0}")]
    UnknownJobStatus(String),

    /// 잘못된 포지션 표기 (TICKER:QTY:AVG_COST)
    #[error("잘못된 포지션 형식: {0}")]
    InvalidPosition(String),
}
