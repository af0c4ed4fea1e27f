//! 보유 포지션 정의.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ParseError;

/// 포트폴리오 보유 종목.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 종목 티커
    pub ticker: String,
    /// 보유 수량
    pub quantity: Decimal,
    /// 평균 매입가
    pub avg_cost: Decimal,
}

impl Position {
    /// 매입 금액
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.avg_cost
    }

    /// 주어진 가격 기준 평가 금액
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// 주어진 가격 기준 평가 손익
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.market_value(price) - self.cost_basis()
    }
}

/// `TICKER:QTY:AVG_COST` 형식 파싱.
impl FromStr for Position {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').map(str::trim).collect();
        let [ticker, quantity, avg_cost] = parts.as_slice() else {
            return Err(ParseError::InvalidPosition(s.to_string()));
        };
        if ticker.is_empty() {
            return Err(ParseError::InvalidPosition(s.to_string()));
        }

        let quantity = Decimal::from_str(quantity)
            .map_err(|_| ParseError::InvalidPosition(s.to_string()))?;
        let avg_cost = Decimal::from_str(avg_cost)
            .map_err(|_| ParseError::InvalidPosition(s.to_string()))?;

        Ok(Self {
            ticker: ticker.to_string(),
            quantity,
            avg_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_position() {
        let pos: Position = "7203.T:100:2500".parse().unwrap();
        assert_eq!(pos.ticker, "7203.T");
        assert_eq!(pos.quantity, dec!(100));
        assert_eq!(pos.avg_cost, dec!(2500));
    }

    #[test]
    fn test_parse_position_invalid() {
        assert!("7203.T:100".parse::<Position>().is_err());
        assert!(":100:2500".parse::<Position>().is_err());
        assert!("7203.T:abc:2500".parse::<Position>().is_err());
    }

    #[test]
    fn test_position_pnl() {
        let pos: Position = "6758.T:10:12000".parse().unwrap();
        assert_eq!(pos.cost_basis(), dec!(120000));
        assert_eq!(pos.market_value(dec!(13000)), dec!(130000));
        assert_eq!(pos.unrealized_pnl(dec!(11000)), dec!(-10000));
    }
}
