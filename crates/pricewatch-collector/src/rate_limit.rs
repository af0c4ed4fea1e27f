//! 전역 토큰 버킷 요청 제한기.
//!
//! 모든 수집 워커가 하나의 `RateLimiter`를 공유하므로 워커 수와 무관하게
//! 전체 처리량이 제한됩니다.
//!
//! # 리필 규칙
//!
//! - 마지막 리필 이후 `refill_interval` 이상 경과: 토큰을 용량까지 채움
//! - 그 미만: `floor(capacity * elapsed / refill_interval)` 만큼 추가 (용량 상한).
//!   추가된 토큰이 0이면 `last_refill`을 갱신하지 않음 (부분 경과 시간 누적)
//!
//! 잠금 구간에서는 시계 읽기, 리필 계산, 토큰 차감만 수행합니다.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// 대기 재확인 최소 간격
const MIN_RECHECK: Duration = Duration::from_millis(1);

/// Rate Limiter 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// 버킷 용량 (리필 주기당 최대 요청 수)
    pub capacity: u32,
    /// 전체 리필 주기
    pub refill_interval: Duration,
    /// `wait` 최대 대기 시간
    pub max_wait: Duration,
}

impl RateLimitConfig {
    /// 초당 요청 수 기반 설정.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self {
            capacity: requests_per_second,
            refill_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
        }
    }

    /// 최대 대기 시간을 설정합니다.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// `wait` 실패 사유.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// 취소 신호 수신
    #[error("rate limiter wait cancelled")]
    Cancelled,

    /// 최대 대기 시간 초과
    #[error("rate limiter wait exceeded {0:?}")]
    DeadlineExceeded(Duration),
}

/// 버킷 내부 상태.
#[derive(Debug, Clone)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, config: &RateLimitConfig) {
        // 시계가 뒤로 가면 0으로 처리
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }

        if elapsed >= config.refill_interval {
            self.tokens = config.capacity;
            self.last_refill = now;
            return;
        }

        let added = (u128::from(config.capacity) * elapsed.as_nanos())
            / config.refill_interval.as_nanos();
        if added > 0 {
            let added = u32::try_from(added).unwrap_or(u32::MAX);
            self.tokens = self.tokens.saturating_add(added).min(config.capacity);
            self.last_refill = now;
        }
    }
}

/// 토큰 버킷 Rate Limiter.
///
/// # Example
///
/// ```ignore
/// let limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_second(5)));
///
/// // 비차단 확인
/// if limiter.allow() { /* 요청 */ }
///
/// // 토큰이 생길 때까지 대기 (취소 가능)
/// limiter.wait(&shutdown).await?;
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// 가득 찬 버킷으로 생성합니다.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 초당 요청 수 기반으로 생성합니다.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(RateLimitConfig::per_second(requests_per_second))
    }

    /// 설정 반환.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// 토큰 하나를 즉시 소비 시도합니다.
    pub fn allow(&self) -> bool {
        self.try_acquire_at(Instant::now()).is_ok()
    }

    /// 현재 사용 가능한 토큰 수 (리필 반영).
    pub fn available(&self) -> u32 {
        let mut state = self.lock_state();
        state.refill(Instant::now(), &self.config);
        state.tokens
    }

    /// 토큰을 얻을 때까지 대기합니다.
    ///
    /// 취소 신호가 오거나 `max_wait`이 지나면 에러를 반환합니다.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        let deadline = Instant::now() + self.config.max_wait;

        loop {
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }

            let now = Instant::now();
            let retry_in = match self.try_acquire_at(now) {
                Ok(()) => return Ok(()),
                Err(retry_in) => retry_in,
            };

            if now >= deadline {
                warn!(max_wait = ?self.config.max_wait, "Rate limiter 대기 시간 초과");
                return Err(RateLimitError::DeadlineExceeded(self.config.max_wait));
            }

            let wake_at = (now + retry_in).min(deadline);
            trace!(retry_in = ?retry_in, "Rate limiter 토큰 대기");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = sleep_until(wake_at) => {}
            }
        }
    }

    /// 토큰 소비 시도. 실패 시 다음 토큰까지 예상 대기 시간을 반환.
    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.lock_state();
        state.refill(now, &self.config);

        if state.tokens > 0 {
            state.tokens -= 1;
            return Ok(());
        }

        if self.config.capacity == 0 {
            return Err(self.config.max_wait.max(MIN_RECHECK));
        }

        let per_token = self.config.refill_interval / self.config.capacity;
        let elapsed = now.saturating_duration_since(state.last_refill);
        Err(per_token.saturating_sub(elapsed).max(MIN_RECHECK))
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(capacity: u32, interval_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            capacity,
            refill_interval: Duration::from_millis(interval_ms),
            max_wait: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_fresh_limiter_allows_exactly_capacity() {
        for capacity in [1, 3, 10] {
            let limiter = RateLimiter::new(config(capacity, 60_000));
            for _ in 0..capacity {
                assert!(limiter.allow());
            }
            assert!(!limiter.allow());
        }
    }

    #[test]
    fn test_zero_capacity_never_allows() {
        let limiter = RateLimiter::new(config(0, 100));
        assert!(!limiter.allow());
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_full_interval_refills_to_capacity_only() {
        let cfg = config(5, 100);
        let base = Instant::now();
        let mut state = BucketState {
            tokens: 1,
            last_refill: base,
        };

        state.refill(base + Duration::from_millis(1_000), &cfg);
        assert_eq!(state.tokens, 5);
    }

    #[test]
    fn test_partial_refill_keeps_last_refill_when_nothing_added() {
        let cfg = config(2, 100);
        let base = Instant::now();
        let mut state = BucketState {
            tokens: 0,
            last_refill: base,
        };

        // 2 * 40 / 100 = 0
        state.refill(base + Duration::from_millis(40), &cfg);
        assert_eq!(state.tokens, 0);
        assert_eq!(state.last_refill, base);

        // 2 * 60 / 100 = 1
        state.refill(base + Duration::from_millis(60), &cfg);
        assert_eq!(state.tokens, 1);
        assert_eq!(state.last_refill, base + Duration::from_millis(60));
    }

    #[test]
    fn test_clock_going_backwards_is_noop() {
        let cfg = config(3, 100);
        let base = Instant::now() + Duration::from_secs(5);
        let mut state = BucketState {
            tokens: 1,
            last_refill: base,
        };

        state.refill(base - Duration::from_secs(1), &cfg);
        assert_eq!(state.tokens, 1);
        assert_eq!(state.last_refill, base);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_three_refills_after_interval() {
        let limiter = RateLimiter::new(config(3, 100));
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_never_exceeds_capacity() {
        let limiter = RateLimiter::new(config(4, 100));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(limiter.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_until_token_available() {
        let limiter = RateLimiter::new(config(1, 100));
        let cancel = CancellationToken::new();
        assert!(limiter.allow());

        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_honors_cancellation() {
        let limiter = RateLimiter::new(config(0, 100));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(limiter.wait(&cancel).await, Err(RateLimitError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_deadline_on_zero_capacity() {
        let limiter = RateLimiter::new(config(0, 100));
        let cancel = CancellationToken::new();

        let err = limiter.wait(&cancel).await.unwrap_err();
        assert_eq!(err, RateLimitError::DeadlineExceeded(Duration::from_secs(1)));
    }

    proptest! {
        #[test]
        fn prop_partial_refill_is_monotonic(
            capacity in 1u32..200,
            interval_ms in 2u64..10_000,
            a in 1u64..10_000,
            b in 1u64..10_000,
        ) {
            let (t1, t2) = (a.min(b) % interval_ms, a.max(b) % interval_ms);
            prop_assume!(0 < t1 && t1 < t2);

            let cfg = config(capacity, interval_ms);
            let base = Instant::now();
            let empty = BucketState { tokens: 0, last_refill: base };

            let mut s1 = empty.clone();
            s1.refill(base + Duration::from_millis(t1), &cfg);
            let mut s2 = empty;
            s2.refill(base + Duration::from_millis(t2), &cfg);

            prop_assert!(s1.tokens <= s2.tokens);
            prop_assert!(s2.tokens <= capacity);
        }
    }
}
