//! 시세 스냅샷 정의.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 특정 시점에 수집한 종목 시세.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
pub struct Quote {
    /// 종목 티커 (예: 7203.T)
    pub ticker: String,
    /// 현재가
    pub price: Decimal,
    /// 전일 종가
    pub previous_close: Option<Decimal>,
    /// 통화 코드
    pub currency: Option<String>,
    /// 수집 시각
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// 현재 시각 기준 시세를 생성합니다.
    pub fn new(ticker: impl Into<String>, price: Decimal) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            previous_close: None,
            currency: None,
            fetched_at: Utc::now(),
        }
    }

    /// 전일 종가를 설정합니다.
    pub fn with_previous_close(mut self, previous_close: Decimal) -> Self {
        self.previous_close = Some(previous_close);
        self
    }

    /// 통화를 설정합니다.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// 전일 대비 변동률 (%).
    ///
    /// 전일 종가가 없거나 0이면 `None`.
    pub fn change_percent(&self) -> Option<Decimal> {
        let prev = self.previous_close?;
        if prev.is_zero() {
            return None;
        }
        Some(((self.price - prev) / prev * Decimal::ONE_HUNDRED).round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_change_percent() {
        let quote = Quote::new("7203.T", dec!(2750)).with_previous_close(dec!(2500));
        assert_eq!(quote.change_percent(), Some(dec!(10.00)));

        let down = Quote::new("6758.T", dec!(90)).with_previous_close(dec!(100));
        assert_eq!(down.change_percent(), Some(dec!(-10.00)));
    }

    #[test]
    fn test_change_percent_without_previous_close() {
        let quote = Quote::new("9984.T", dec!(8000));
        assert_eq!(quote.change_percent(), None);

        let zero = Quote::new("9984.T", dec!(8000)).with_previous_close(Decimal::ZERO);
        assert_eq!(zero.change_percent(), None);
    }
}
