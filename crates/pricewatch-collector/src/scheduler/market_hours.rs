//! 장 운영 시간 판정.
//!
//! 주말, 휴장일은 닫힘. 평일에는 `[open, morning_close) ∪ [afternoon_open, close)`
//! 구간만 열림 (시장 현지 시각 기준).

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

use super::SchedulerError;

/// 시/분 상수 생성
pub(crate) const fn hm(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(t) => t,
        None => panic!("invalid time literal"),
    }
}

/// 도쿄증권거래소 기본 세션
pub const DEFAULT_OPEN: NaiveTime = hm(9, 0);
pub const DEFAULT_MORNING_CLOSE: NaiveTime = hm(11, 30);
pub const DEFAULT_AFTERNOON_OPEN: NaiveTime = hm(12, 30);
pub const DEFAULT_CLOSE: NaiveTime = hm(15, 30);

/// 장 운영 시간.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketHours {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub morning_close: NaiveTime,
    pub afternoon_open: NaiveTime,
    pub close: NaiveTime,
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Tokyo,
            open: DEFAULT_OPEN,
            morning_close: DEFAULT_MORNING_CLOSE,
            afternoon_open: DEFAULT_AFTERNOON_OPEN,
            close: DEFAULT_CLOSE,
            holidays: BTreeSet::new(),
        }
    }
}

impl MarketHours {
    /// 세션 경계를 검증하며 생성합니다.
    ///
    /// `open <= morning_close <= afternoon_open <= close`, `open < close`여야 합니다.
    pub fn new(
        timezone: Tz,
        open: NaiveTime,
        morning_close: NaiveTime,
        afternoon_open: NaiveTime,
        close: NaiveTime,
    ) -> Result<Self, SchedulerError> {
        if !(open <= morning_close && morning_close <= afternoon_open && afternoon_open <= close)
            || open >= close
        {
            return Err(SchedulerError::InvalidMarketHours(format!(
                "{open} / {morning_close} / {afternoon_open} / {close}"
            )));
        }

        Ok(Self {
            timezone,
            open,
            morning_close,
            afternoon_open,
            close,
            holidays: BTreeSet::new(),
        })
    }

    /// 휴장일을 추가합니다.
    pub fn with_holidays<I: IntoIterator<Item = NaiveDate>>(mut self, holidays: I) -> Self {
        self.holidays.extend(holidays);
        self
    }

    /// 거래일 여부 (주말/휴장일 제외).
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// 주어진 시각에 장이 열려 있는지 확인합니다.
    pub fn is_open<Z: TimeZone>(&self, at: &DateTime<Z>) -> bool {
        let local = at.with_timezone(&self.timezone);
        if !self.is_trading_day(local.date_naive()) {
            return false;
        }

        let time = local.time();
        (self.open <= time && time < self.morning_close)
            || (self.afternoon_open <= time && time < self.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tokyo(date: (i32, u32, u32), time: (u32, u32)) -> DateTime<Tz> {
        chrono_tz::Asia::Tokyo
            .with_ymd_and_hms(date.0, date.1, date.2, time.0, time.1, 0)
            .unwrap()
    }

    // 2024-01-08: 월요일, 2024-01-13: 토요일
    const MONDAY: (i32, u32, u32) = (2024, 1, 8);
    const SATURDAY: (i32, u32, u32) = (2024, 1, 13);

    #[test]
    fn test_weekday_sessions() {
        let hours = MarketHours::default();
        assert!(hours.is_open(&tokyo(MONDAY, (10, 0))));
        assert!(!hours.is_open(&tokyo(MONDAY, (12, 0))));
        assert!(hours.is_open(&tokyo(MONDAY, (12, 30))));
        assert!(!hours.is_open(&tokyo(SATURDAY, (10, 0))));
    }

    #[test]
    fn test_boundaries_are_inclusive_exclusive() {
        let hours = MarketHours::default();
        assert!(hours.is_open(&tokyo(MONDAY, (9, 0))));
        assert!(!hours.is_open(&tokyo(MONDAY, (8, 59))));
        assert!(!hours.is_open(&tokyo(MONDAY, (11, 30))));
        assert!(hours.is_open(&tokyo(MONDAY, (15, 29))));
        assert!(!hours.is_open(&tokyo(MONDAY, (15, 30))));
    }

    #[test]
    fn test_converts_from_utc() {
        let hours = MarketHours::default();
        // 01:00 UTC = 10:00 JST
        let utc = Utc.with_ymd_and_hms(2024, 1, 8, 1, 0, 0).unwrap();
        assert!(hours.is_open(&utc));
        // 03:00 UTC = 12:00 JST
        let lunch = Utc.with_ymd_and_hms(2024, 1, 8, 3, 0, 0).unwrap();
        assert!(!hours.is_open(&lunch));
    }

    #[test]
    fn test_holiday_is_closed() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let hours = MarketHours::default().with_holidays([monday]);
        assert!(!hours.is_open(&tokyo(MONDAY, (10, 0))));
        assert!(hours.is_trading_day(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()));
    }

    #[test]
    fn test_new_rejects_inverted_sessions() {
        let result = MarketHours::new(
            chrono_tz::Asia::Tokyo,
            DEFAULT_OPEN,
            DEFAULT_AFTERNOON_OPEN,
            DEFAULT_MORNING_CLOSE,
            DEFAULT_CLOSE,
        );
        assert!(result.is_err());
    }
}
