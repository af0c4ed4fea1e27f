//! 시세 조회 에러 타입.

use crate::executor::BatchItemError;
use crate::rate_limit::RateLimitError;

/// 시세 조회 에러.
///
/// 재시도 여부는 [`ErrorClassifier`](crate::retry::ErrorClassifier)가 판정합니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// 요청 타임아웃
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// 연결 거부
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// 연결 리셋
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    /// DNS 조회 실패
    #[error("DNS lookup failed: {0}")]
    Dns(String),

    /// HTTP 상태 코드 에러
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 기타 전송 계층 에러
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        timeout: bool,
        temporary: bool,
    },

    /// 응답 형식 오류
    #[error("Malformed payload: {0}")]
    Decode(String),

    /// 존재하지 않는 종목
    #[error("Ticker not found: {0}")]
    NotFound(String),

    /// Rate limiter 대기 시간 초과
    #[error("Rate limiter wait exceeded {0:?}")]
    RateLimitDeadline(std::time::Duration),

    /// 취소됨
    #[error("Fetch cancelled")]
    Cancelled,

    /// 재시도 소진
    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    /// 분류되지 않은 에러
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// 취소 계열 에러인지 확인.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::RateLimitDeadline(_))
    }

    /// 재시도 소진 시 마지막 원인 에러를 반환합니다.
    pub fn root_cause(&self) -> &FetchError {
        match self {
            Self::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// 종료 신호로 중단된 조회만 취소로 집계합니다. Rate limiter 대기 초과는 실패입니다.
impl BatchItemError for FetchError {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<RateLimitError> for FetchError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Cancelled => Self::Cancelled,
            RateLimitError::DeadlineExceeded(max_wait) => Self::RateLimitDeadline(max_wait),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);

        if err.is_timeout() {
            Self::Timeout(message)
        } else if err.is_connect() {
            let lower = message.to_lowercase();
            if lower.contains("dns") || lower.contains("resolve") {
                Self::Dns(message)
            } else if lower.contains("refused") {
                Self::ConnectionRefused(message)
            } else if lower.contains("reset") {
                Self::ConnectionReset(message)
            } else {
                Self::Transport {
                    message,
                    timeout: false,
                    temporary: true,
                }
            }
        } else if err.is_decode() {
            Self::Decode(message)
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: message,
            }
        } else {
            Self::Transport {
                message,
                timeout: false,
                temporary: false,
            }
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// reqwest 에러는 원인을 source 체인에 숨기므로 전체를 이어 붙입니다.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
