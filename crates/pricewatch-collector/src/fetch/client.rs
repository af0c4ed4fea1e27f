//! Rate limit + 재시도 시세 조회 클라이언트.

use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::Quote;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{FetchError, QuoteFetcher};
use crate::rate_limit::RateLimiter;
use crate::retry::{ErrorClassifier, RetryClass, RetryPolicy};

/// 종목 하나에 대한 진행 중인 조회 상태.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    /// 종목 코드
    pub key: String,
    /// 현재 시도 번호 (1부터)
    pub attempt: u32,
    /// 직전 시도 에러
    pub last_error: Option<FetchError>,
    /// 다음 시도 전 대기 시간
    pub next_backoff: Duration,
}

impl FetchAttempt {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            attempt: 0,
            last_error: None,
            next_backoff: Duration::ZERO,
        }
    }

    fn record_failure(&mut self, err: FetchError, backoff: Duration) {
        self.last_error = Some(err);
        self.next_backoff = backoff;
    }
}

/// 시세 조회 클라이언트.
///
/// 매 시도마다 Rate Limiter 토큰을 얻고, 요청 타임아웃을 적용하며,
/// [`ErrorClassifier`]가 재시도 가능으로 판정한 에러만 선형 백오프로 재시도합니다.
pub struct FetchClient {
    fetcher: Arc<dyn QuoteFetcher>,
    limiter: Arc<RateLimiter>,
    classifier: ErrorClassifier,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl FetchClient {
    /// 새 클라이언트를 생성합니다.
    pub fn new(
        fetcher: Arc<dyn QuoteFetcher>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            classifier: ErrorClassifier::default(),
            policy,
            request_timeout,
        }
    }

    /// 에러 분류기를 교체합니다.
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// 종목 시세를 조회합니다.
    ///
    /// # Errors
    ///
    /// - 취소 또는 Rate limiter 대기 초과: 즉시 반환 (시도 횟수에 포함되지 않음)
    /// - 종료 에러: 원본 에러 그대로 반환
    /// - 재시도 소진: [`FetchError::RetriesExhausted`]
    pub async fn fetch_one(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, FetchError> {
        let mut state = FetchAttempt::new(key);

        loop {
            self.limiter.wait(cancel).await?;
            state.attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = tokio::time::timeout(self.request_timeout, self.fetcher.fetch(key)) => result,
            };

            let err = match outcome {
                Ok(Ok(quote)) => {
                    if let Some(previous) = &state.last_error {
                        debug!(
                            ticker = key,
                            attempt = state.attempt,
                            previous_error = %previous,
                            "재시도 후 조회 성공"
                        );
                    }
                    return Ok(quote);
                }
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(format!(
                    "{}: no response within {}ms",
                    key,
                    self.request_timeout.as_millis()
                )),
            };

            if err.is_cancellation() {
                return Err(err);
            }

            match self.classifier.classify(&err) {
                RetryClass::Terminal => {
                    debug!(ticker = key, attempt = state.attempt, error = %err, "재시도 불가 에러");
                    return Err(err);
                }
                RetryClass::Retryable if state.attempt > self.policy.max_retries => {
                    warn!(
                        ticker = key,
                        attempts = state.attempt,
                        error = %err,
                        "재시도 횟수 소진"
                    );
                    return Err(FetchError::RetriesExhausted {
                        attempts: state.attempt,
                        source: Box::new(err),
                    });
                }
                RetryClass::Retryable => {
                    let backoff = self.policy.backoff_for(state.attempt);
                    warn!(
                        ticker = key,
                        source = self.fetcher.name(),
                        attempt = state.attempt,
                        max_retries = self.policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "일시적 에러, 재시도 대기"
                    );
                    state.record_failure(err, backoff);

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(state.next_backoff) => {}
                    }
                }
            }
        }
    }
}
