//! 환경변수 기반 설정 모듈.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use pricewatch_core::Position;

use crate::error::CollectorError;
use crate::executor::DEFAULT_ESCALATION_THRESHOLD;
use crate::fetch::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::scheduler::{
    hm, MarketHours, DEFAULT_AFTERNOON_OPEN, DEFAULT_CLOSE, DEFAULT_MORNING_CLOSE, DEFAULT_OPEN,
};
use crate::Result;

const DEFAULT_TICKERS: &str = "7203.T,6758.T,9984.T";

/// 수집 주기 상한 (하루)
const MAX_COLLECT_INTERVAL_MINUTES: u64 = 24 * 60;
/// 실행 기록 보존 상한 (100년)
const MAX_RUN_RETENTION_DAYS: i64 = 36_500;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL (없으면 인메모리 저장소)
    pub database_url: Option<String>,
    /// 수집 대상 종목
    pub tickers: Vec<String>,
    /// 보유 종목 (리포트용)
    pub positions: Vec<Position>,
    /// 시세 조회 설정
    pub fetch: FetchConfig,
    /// 배치 수집 설정
    pub collect: CollectConfig,
    /// 스케줄 설정
    pub schedule: ScheduleConfig,
    /// 장 운영 시간
    pub market_hours: MarketHours,
}

/// 시세 조회 설정
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// 엔드포인트 템플릿 (`{ticker}` 치환)
    pub endpoint: String,
    /// User-Agent 헤더
    pub user_agent: String,
    /// 요청 타임아웃 (밀리초)
    pub request_timeout_ms: u64,
    /// 전역 초당 요청 수
    pub requests_per_second: u32,
    /// 최대 재시도 횟수
    pub max_retries: u32,
    /// 기본 백오프 (밀리초)
    pub base_backoff_ms: u64,
    /// 백오프 상한 (밀리초)
    pub max_backoff_ms: u64,
    /// Rate limiter 최대 대기 (밀리초)
    pub rate_limit_max_wait_ms: u64,
}

/// 배치 수집 설정
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// 최대 동시 수집 수
    pub max_concurrency: usize,
    /// 워커별 항목 간 딜레이 (밀리초)
    pub pacing_ms: u64,
    /// 긴급 알림 실패율 임계치
    pub escalation_threshold: f64,
}

/// 스케줄 설정
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// 시세 수집 주기 (분 단위)
    pub collect_interval_minutes: u64,
    /// 리포트 요일
    pub report_weekdays: Vec<Weekday>,
    /// 리포트 시각 (시장 현지)
    pub report_time: NaiveTime,
    /// 실행 기록 보존 일수
    pub run_retention_days: i64,
    /// 실행 기록 정리 시각 (시장 현지)
    pub prune_time: NaiveTime,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_ms: 10_000,
            requests_per_second: 5,
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 5_000,
            rate_limit_max_wait_ms: 30_000,
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            pacing_ms: 0,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            collect_interval_minutes: 5,
            report_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            report_time: hm(15, 45),
            run_retention_days: 30,
            prune_time: hm(3, 0),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            tickers: split_list(DEFAULT_TICKERS),
            positions: Vec::new(),
            fetch: FetchConfig::default(),
            collect: CollectConfig::default(),
            schedule: ScheduleConfig::default(),
            market_hours: MarketHours::default(),
        }
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 로드.
    ///
    /// 숫자 값은 파싱 실패 시 기본값을 쓰고, 시각/날짜/시간대/보유 종목은
    /// 형식이 틀리면 에러를 반환합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let timezone: Tz = match env.get("MARKET_TIMEZONE") {
            Some(name) => name
                .parse()
                .map_err(|_| config_error(format!("알 수 없는 시간대: {name}")))?,
            None => defaults.market_hours.timezone,
        };

        let market_hours = MarketHours::new(
            timezone,
            env.time("MARKET_OPEN", DEFAULT_OPEN)?,
            env.time("MARKET_MORNING_CLOSE", DEFAULT_MORNING_CLOSE)?,
            env.time("MARKET_AFTERNOON_OPEN", DEFAULT_AFTERNOON_OPEN)?,
            env.time("MARKET_CLOSE", DEFAULT_CLOSE)?,
        )
        .map_err(|e| config_error(e.to_string()))?
        .with_holidays(env.holidays("MARKET_HOLIDAYS")?);

        let positions = match env.get("PRICEWATCH_POSITIONS") {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|p| Position::from_str(p))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| config_error(e.to_string()))?,
            None => Vec::new(),
        };

        let config = Self {
            database_url: env.get("DATABASE_URL").filter(|url| !url.is_empty()),
            tickers: env
                .get("PRICEWATCH_TICKERS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.tickers),
            positions,
            fetch: FetchConfig {
                endpoint: env.get("QUOTE_ENDPOINT").unwrap_or(defaults.fetch.endpoint),
                user_agent: env
                    .get("QUOTE_USER_AGENT")
                    .unwrap_or(defaults.fetch.user_agent),
                request_timeout_ms: env.parse("QUOTE_REQUEST_TIMEOUT_MS", 10_000),
                requests_per_second: env.parse("QUOTE_REQUESTS_PER_SECOND", 5),
                max_retries: env.parse("QUOTE_MAX_RETRIES", 3),
                base_backoff_ms: env.parse("QUOTE_BASE_BACKOFF_MS", 500),
                max_backoff_ms: env.parse("QUOTE_MAX_BACKOFF_MS", 5_000),
                rate_limit_max_wait_ms: env.parse("QUOTE_RATE_LIMIT_MAX_WAIT_MS", 30_000),
            },
            collect: CollectConfig {
                max_concurrency: env.parse("COLLECT_MAX_CONCURRENCY", 4),
                pacing_ms: env.parse("COLLECT_PACING_MS", 0),
                escalation_threshold: env
                    .parse("COLLECT_ESCALATION_THRESHOLD", DEFAULT_ESCALATION_THRESHOLD),
            },
            schedule: ScheduleConfig {
                collect_interval_minutes: env.parse("COLLECT_INTERVAL_MINUTES", 5),
                report_weekdays: env.weekdays("REPORT_WEEKDAYS", defaults.schedule.report_weekdays)?,
                report_time: env.time("REPORT_TIME", defaults.schedule.report_time)?,
                run_retention_days: env.parse("RUN_RETENTION_DAYS", 30),
                prune_time: env.time("RUN_PRUNE_TIME", defaults.schedule.prune_time)?,
            },
            market_hours,
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.collect.max_concurrency == 0 {
            return Err(config_error("COLLECT_MAX_CONCURRENCY는 1 이상이어야 합니다"));
        }
        if self.fetch.requests_per_second == 0 {
            return Err(config_error("QUOTE_REQUESTS_PER_SECOND는 1 이상이어야 합니다"));
        }
        let threshold = self.collect.escalation_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(config_error(format!(
                "COLLECT_ESCALATION_THRESHOLD는 (0, 1] 범위여야 합니다: {threshold}"
            )));
        }
        let interval = self.schedule.collect_interval_minutes;
        if interval == 0 || interval > MAX_COLLECT_INTERVAL_MINUTES {
            return Err(config_error(format!(
                "COLLECT_INTERVAL_MINUTES는 1..={MAX_COLLECT_INTERVAL_MINUTES} 범위여야 합니다: {interval}"
            )));
        }
        if self.schedule.report_weekdays.is_empty() {
            return Err(config_error("REPORT_WEEKDAYS가 비어 있습니다"));
        }
        let retention = self.schedule.run_retention_days;
        if retention <= 0 || retention > MAX_RUN_RETENTION_DAYS {
            return Err(config_error(format!(
                "RUN_RETENTION_DAYS는 1..={MAX_RUN_RETENTION_DAYS} 범위여야 합니다: {retention}"
            )));
        }
        if !self.fetch.endpoint.contains("{ticker}") {
            return Err(config_error("QUOTE_ENDPOINT에 {ticker}가 없습니다"));
        }
        Ok(())
    }
}

impl FetchConfig {
    /// 요청 타임아웃을 Duration으로 반환
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Rate limiter 설정
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::per_second(self.requests_per_second)
            .with_max_wait(Duration::from_millis(self.rate_limit_max_wait_ms))
    }
}

impl CollectConfig {
    /// 항목 간 딜레이를 Duration으로 반환
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl ScheduleConfig {
    /// 수집 주기를 Duration으로 반환
    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_minutes.saturating_mul(60))
    }

    /// 실행 기록 보존 기간
    pub fn run_retention(&self) -> chrono::Duration {
        let days = self.run_retention_days.clamp(0, MAX_RUN_RETENTION_DAYS);
        chrono::Duration::try_days(days).unwrap_or_else(chrono::Duration::zero)
    }
}

fn config_error(message: impl Into<String>) -> CollectorError {
    CollectorError::Config(message.into())
}

/// 쉼표 구분 목록 (공백 제거, 빈 항목 무시)
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string())
    }

    /// 값을 파싱 (실패 시 기본값 사용)
    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn time(&self, key: &str, default: NaiveTime) -> Result<NaiveTime> {
        match self.get(key) {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
                .map_err(|_| config_error(format!("{key}: HH:MM 형식이 아닙니다 ({raw})"))),
            None => Ok(default),
        }
    }

    fn weekdays(&self, key: &str, default: Vec<Weekday>) -> Result<Vec<Weekday>> {
        match self.get(key) {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|d| {
                    d.parse::<Weekday>()
                        .map_err(|_| config_error(format!("{key}: 알 수 없는 요일 ({d})")))
                })
                .collect(),
            None => Ok(default),
        }
    }

    fn holidays(&self, key: &str) -> Result<BTreeSet<NaiveDate>> {
        match self.get(key) {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|d| {
                    NaiveDate::parse_from_str(d, "%Y-%m-%d")
                        .map_err(|_| config_error(format!("{key}: 날짜 형식 오류 ({d})")))
                })
                .collect(),
            None => Ok(BTreeSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<CollectorConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.tickers, vec!["7203.T", "6758.T", "9984.T"]);
        assert_eq!(config.collect.max_concurrency, 4);
        assert_eq!(config.fetch.retry_policy(), RetryPolicy::default());
        assert_eq!(config.schedule.collect_interval(), Duration::from_secs(300));
        assert_eq!(config.schedule.report_weekdays.len(), 5);
        assert_eq!(config.market_hours, MarketHours::default());
    }

    #[test]
    fn test_overrides_and_lists() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/pricewatch"),
            ("PRICEWATCH_TICKERS", " 7203.T , ,AAPL"),
            ("PRICEWATCH_POSITIONS", "7203.T:100:2500,AAPL:10:180.5"),
            ("COLLECT_MAX_CONCURRENCY", "8"),
            ("QUOTE_MAX_RETRIES", "not-a-number"),
            ("REPORT_WEEKDAYS", "mon,fri"),
            ("REPORT_TIME", "16:10"),
            ("MARKET_TIMEZONE", "America/New_York"),
            ("MARKET_OPEN", "09:30"),
            ("MARKET_MORNING_CLOSE", "16:00"),
            ("MARKET_AFTERNOON_OPEN", "16:00"),
            ("MARKET_CLOSE", "16:00"),
            ("MARKET_HOLIDAYS", "2024-12-25"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/pricewatch"));
        assert_eq!(config.tickers, vec!["7203.T", "AAPL"]);
        assert_eq!(config.positions.len(), 2);
        assert_eq!(config.positions[1].avg_cost, dec!(180.5));
        assert_eq!(config.collect.max_concurrency, 8);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.schedule.report_weekdays, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(config.market_hours.timezone, chrono_tz::America::New_York);
        assert_eq!(config.market_hours.holidays.len(), 1);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = load(&[("COLLECT_MAX_CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        assert!(load(&[("COLLECT_ESCALATION_THRESHOLD", "0")]).is_err());
        assert!(load(&[("COLLECT_ESCALATION_THRESHOLD", "1.5")]).is_err());
        assert!(load(&[("COLLECT_ESCALATION_THRESHOLD", "1.0")]).is_ok());
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(load(&[("REPORT_TIME", "3pm")]).is_err());
        assert!(load(&[("MARKET_TIMEZONE", "Mars/Olympus")]).is_err());
        assert!(load(&[("MARKET_HOLIDAYS", "2024/01/01")]).is_err());
        assert!(load(&[("PRICEWATCH_POSITIONS", "7203.T:abc")]).is_err());
        assert!(load(&[("MARKET_MORNING_CLOSE", "08:00")]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_schedule_values() {
        let huge = u64::MAX.to_string();
        assert!(load(&[("COLLECT_INTERVAL_MINUTES", huge.as_str())]).is_err());
        assert!(load(&[("COLLECT_INTERVAL_MINUTES", "1440")]).is_ok());

        let huge = i64::MAX.to_string();
        assert!(load(&[("RUN_RETENTION_DAYS", huge.as_str())]).is_err());
        assert!(load(&[("RUN_RETENTION_DAYS", "0")]).is_err());
    }

    #[test]
    fn test_duration_helpers_do_not_overflow() {
        let mut schedule = ScheduleConfig::default();
        schedule.collect_interval_minutes = u64::MAX;
        schedule.run_retention_days = i64::MAX;

        assert_eq!(schedule.collect_interval(), Duration::from_secs(u64::MAX));
        assert_eq!(
            schedule.run_retention(),
            chrono::Duration::days(MAX_RUN_RETENTION_DAYS)
        );
    }
}
