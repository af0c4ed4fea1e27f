//! 에러 재시도 분류 및 백오프 정책.
//!
//! 분류 순서:
//! 1. 타임아웃, 연결 거부/리셋, DNS 실패 → 재시도
//! 2. HTTP 429, 5xx → 재시도 / 그 외 4xx → 종료
//! 3. 전송 계층 에러 중 timeout/temporary 표시 → 재시도
//! 4. 취소, 응답 형식 오류, 미존재 종목 → 종료
//! 5. 에러 메시지에 일시적 장애 문구 포함 → 재시도
//! 6. 나머지 → 종료

use std::time::Duration;

use crate::fetch::FetchError;

/// 일시적 장애를 나타내는 에러 문구 (대소문자 무시)
pub const DEFAULT_TRANSIENT_PHRASES: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "broken pipe",
    "no such host",
    "temporary failure",
    "service unavailable",
    "too many requests",
    "rate limit",
    "eof",
];

/// 재시도 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 백오프 후 재시도
    Retryable,
    /// 즉시 실패 처리
    Terminal,
}

/// 에러 분류기.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    transient_phrases: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::with_phrases(DEFAULT_TRANSIENT_PHRASES.iter().copied())
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 일시적 장애 문구 목록을 지정해 생성합니다.
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            transient_phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// 에러를 분류합니다.
    pub fn classify(&self, err: &FetchError) -> RetryClass {
        match err {
            FetchError::Timeout(_)
            | FetchError::ConnectionRefused(_)
            | FetchError::ConnectionReset(_)
            | FetchError::Dns(_) => return RetryClass::Retryable,

            FetchError::Http { status, .. } => {
                if let Some(class) = Self::classify_status(*status) {
                    return class;
                }
            }

            FetchError::Transport {
                timeout, temporary, ..
            } if *timeout || *temporary => return RetryClass::Retryable,

            FetchError::Cancelled
            | FetchError::RateLimitDeadline(_)
            | FetchError::RetriesExhausted { .. }
            | FetchError::Decode(_)
            | FetchError::NotFound(_) => return RetryClass::Terminal,

            _ => {}
        }

        if self.matches_transient_phrase(&err.to_string()) {
            RetryClass::Retryable
        } else {
            RetryClass::Terminal
        }
    }

    /// HTTP 상태 코드 분류. 4xx/5xx가 아니면 `None`.
    pub fn classify_status(status: u16) -> Option<RetryClass> {
        match status {
            429 | 500..=599 => Some(RetryClass::Retryable),
            400..=499 => Some(RetryClass::Terminal),
            _ => None,
        }
    }

    fn matches_transient_phrase(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.transient_phrases
            .iter()
            .any(|phrase| message.contains(phrase.as_str()))
    }
}

/// 재시도 정책.
///
/// 총 시도 횟수는 `max_retries + 1`입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수
    pub max_retries: u32,
    /// 기본 백오프
    pub base_backoff: Duration,
    /// 백오프 상한
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// `attempt`번째 시도 실패 후 대기 시간: `min(attempt * base, max)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(attempt.max(1))
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> FetchError {
        FetchError::Http {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let classifier = ErrorClassifier::new();
        for err in [
            FetchError::Timeout("10s".into()),
            FetchError::ConnectionRefused("127.0.0.1:1".into()),
            FetchError::ConnectionReset("peer".into()),
            FetchError::Dns("query1.finance.yahoo.com".into()),
        ] {
            assert_eq!(classifier.classify(&err), RetryClass::Retryable, "{err}");
        }
    }

    #[test]
    fn test_http_status_classification() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify(&http(429)), RetryClass::Retryable);
        assert_eq!(classifier.classify(&http(500)), RetryClass::Retryable);
        assert_eq!(classifier.classify(&http(503)), RetryClass::Retryable);
        assert_eq!(classifier.classify(&http(400)), RetryClass::Terminal);
        assert_eq!(classifier.classify(&http(404)), RetryClass::Terminal);
    }

    #[test]
    fn test_non_error_status_falls_through_to_phrases() {
        let classifier = ErrorClassifier::new();
        let err = FetchError::Http {
            status: 302,
            body: "Service Unavailable".into(),
        };
        assert_eq!(classifier.classify(&err), RetryClass::Retryable);
        assert_eq!(classifier.classify(&http(302)), RetryClass::Terminal);
    }

    #[test]
    fn test_transport_flags() {
        let classifier = ErrorClassifier::new();
        let temporary = FetchError::Transport {
            message: "h2 stream".into(),
            timeout: false,
            temporary: true,
        };
        let permanent = FetchError::Transport {
            message: "invalid certificate".into(),
            timeout: false,
            temporary: false,
        };
        assert_eq!(classifier.classify(&temporary), RetryClass::Retryable);
        assert_eq!(classifier.classify(&permanent), RetryClass::Terminal);
    }

    #[test]
    fn test_phrase_match_is_case_insensitive() {
        let classifier = ErrorClassifier::new();
        let err = FetchError::Other("upstream said: Connection RESET by peer".into());
        assert_eq!(classifier.classify(&err), RetryClass::Retryable);
        assert_eq!(
            classifier.classify(&FetchError::Other("invalid ticker format".into())),
            RetryClass::Terminal
        );
    }

    #[test]
    fn test_cancellation_is_never_retried() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.classify(&FetchError::Cancelled), RetryClass::Terminal);
        assert_eq!(
            classifier.classify(&FetchError::RateLimitDeadline(Duration::from_secs(30))),
            RetryClass::Terminal
        );
    }

    #[test]
    fn test_decode_error_terminal_even_with_timeout_text() {
        let classifier = ErrorClassifier::new();
        let err = FetchError::Decode("field 'timeout' missing".into());
        assert_eq!(classifier.classify(&err), RetryClass::Terminal);
    }

    #[test]
    fn test_custom_phrases() {
        let classifier = ErrorClassifier::with_phrases(["Maintenance"]);
        let err = FetchError::Other("scheduled maintenance window".into());
        assert_eq!(classifier.classify(&err), RetryClass::Retryable);
        assert_eq!(
            classifier.classify(&FetchError::Other("timed out".into())),
            RetryClass::Terminal
        );
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(1_200),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(1_200));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(1_200));
    }
}
