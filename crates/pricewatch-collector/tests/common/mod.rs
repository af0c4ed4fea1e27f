//! 통합 테스트 공용 도우미.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pricewatch_collector::fetch::{FetchError, QuoteFetcher};
use pricewatch_collector::scheduler::{Clock, JobHandler};
use pricewatch_core::Quote;
use pricewatch_notification::{Notification, NotificationResult, NotificationSender};
use rust_decimal_macros::dec;

/// 도쿄 현지 시각 → UTC
pub fn tokyo(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Tokyo
        .with_ymd_and_hms(y, m, d, hh, mm, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

/// 종목별로 정해진 횟수만큼 실패한 뒤 성공하는 fetcher
#[derive(Default)]
pub struct StubFetcher {
    plan: Mutex<HashMap<String, (u32, FetchError)>>,
    calls: Mutex<HashMap<String, u32>>,
    delay: Duration,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(self, ticker: &str, times: u32, error: FetchError) -> Self {
        self.plan
            .lock()
            .unwrap()
            .insert(ticker.to_string(), (times, error));
        self
    }

    /// 매 조회를 `delay`만큼 지연시킵니다.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn always_fail(self, ticker: &str, error: FetchError) -> Self {
        self.fail_times(ticker, u32::MAX, error)
    }

    pub fn calls(&self, ticker: &str) -> u32 {
        self.calls.lock().unwrap().get(ticker).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QuoteFetcher for StubFetcher {
    async fn fetch(&self, ticker: &str) -> Result<Quote, FetchError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(ticker.to_string()).or_default();
            *entry += 1;
            *entry - 1
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some((times, error)) = self.plan.lock().unwrap().get(ticker) {
            if n < *times {
                return Err(error.clone());
            }
        }
        Ok(Quote::new(ticker, dec!(1000)).with_previous_close(dec!(980)))
    }
}

/// 전송된 알림을 기록하는 전송기
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingSender {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 실행 횟수를 세고 `hold`만큼 머무는 작업
#[derive(Default)]
pub struct CountingJob {
    pub runs: AtomicUsize,
    pub hold: Duration,
}

impl CountingJob {
    pub fn holding(hold: Duration) -> Self {
        Self {
            runs: AtomicUsize::new(0),
            hold,
        }
    }

    pub fn count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for CountingJob {
    async fn run(&self) -> pricewatch_collector::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        Ok(())
    }
}
