//! Yahoo Finance chart API 시세 조회.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pricewatch_core::Quote;
use reqwest::StatusCode;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::{FetchError, QuoteFetcher};

/// 기본 엔드포인트 템플릿 (`{ticker}` 치환)
pub const DEFAULT_ENDPOINT: &str =
    "https://query1.finance.yahoo.com/v8/finance/chart/{ticker}?interval=1d&range=1d";

/// 기본 User-Agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; pricewatch/0.1)";

/// 에러 본문 최대 보존 길이
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
}

/// HTTP 시세 조회기.
pub struct HttpQuoteFetcher {
    client: reqwest::Client,
    endpoint_template: String,
}

impl HttpQuoteFetcher {
    /// 새 조회기를 생성합니다.
    pub fn new(
        endpoint_template: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint_template: endpoint_template.into(),
        })
    }

    /// 종목 코드로 요청 URL을 만듭니다.
    pub fn url_for(&self, ticker: &str) -> String {
        let encoded = ticker.replace('^', "%5E").replace('=', "%3D");
        self.endpoint_template.replace("{ticker}", &encoded)
    }

    fn parse(ticker: &str, body: &str) -> Result<Quote, FetchError> {
        let response: ChartResponse = serde_json::from_str(body)?;

        if let Some(error) = response.chart.error {
            let description = error.description.unwrap_or_default();
            if error.code.eq_ignore_ascii_case("not found") {
                return Err(FetchError::NotFound(ticker.to_string()));
            }
            return Err(FetchError::Other(format!("{}: {}", error.code, description)));
        }

        let meta = response
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(|r| r.meta)
            .ok_or_else(|| FetchError::NotFound(ticker.to_string()))?;

        let price = meta
            .regular_market_price
            .and_then(to_decimal)
            .ok_or_else(|| FetchError::Decode(format!("{ticker}: regularMarketPrice missing")))?;

        let mut quote = Quote::new(ticker, price);
        if let Some(prev) = meta
            .chart_previous_close
            .or(meta.previous_close)
            .and_then(to_decimal)
        {
            quote = quote.with_previous_close(prev);
        }
        if let Some(currency) = meta.currency {
            quote = quote.with_currency(currency);
        }
        if let Some(ts) = meta
            .regular_market_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
        {
            quote.fetched_at = ts;
        }

        Ok(quote)
    }
}

#[async_trait]
impl QuoteFetcher for HttpQuoteFetcher {
    async fn fetch(&self, ticker: &str) -> Result<Quote, FetchError> {
        let url = self.url_for(ticker);
        debug!(ticker = ticker, url = %url, "시세 요청");

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(ticker.to_string()));
        }

        let body = response.text().await?;
        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FetchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Self::parse(ticker, &body)
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(4).normalize())
}
