//! 시세 조회 계층.
//!
//! - [`QuoteFetcher`]: 종목 하나를 한 번 조회하는 원격 호출 추상화
//! - [`FetchClient`]: 전역 Rate Limiter, 타임아웃, 분류 기반 재시도를 적용하는 래퍼
//! - [`HttpQuoteFetcher`]: Yahoo Finance chart API 구현체

mod client;
mod error;
mod http;

pub use client::{FetchAttempt, FetchClient};
pub use error::FetchError;
pub use http::{HttpQuoteFetcher, DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};

use async_trait::async_trait;
use pricewatch_core::Quote;

/// 단일 시세 조회.
///
/// 구현체는 재시도나 요청 제한을 하지 않습니다. [`FetchClient`]가 담당합니다.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// 종목 시세를 한 번 조회합니다.
    async fn fetch(&self, ticker: &str) -> Result<Quote, FetchError>;

    /// 로그용 이름
    fn name(&self) -> &str {
        "quote"
    }
}
