//! 텔레그램 알림 전송기.
//!
//! Telegram Bot API `sendMessage`로 HTML 메시지를 전송합니다.

use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationPriority, NotificationResult,
    NotificationSender,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, error, warn};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// 텔레그램 전송 설정.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// @BotFather에서 받은 봇 토큰
    pub bot_token: String,
    /// 메시지를 보낼 채팅 ID
    pub chat_id: String,
    /// 전송 활성화 여부
    pub enabled: bool,
    /// Bot API 주소 (테스트에서 교체)
    pub api_base: String,
}

impl TelegramConfig {
    /// 새 텔레그램 설정을 생성합니다.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            enabled: true,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Bot API 주소를 변경합니다.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// 환경 변수에서 설정을 생성합니다.
    ///
    /// `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`가 없으면 `None`.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Some(Self {
            enabled,
            ..Self::new(bot_token, chat_id)
        })
    }
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 텔레그램 전송기를 생성합니다.
    pub fn new(config: TelegramConfig) -> NotificationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, client })
    }

    /// 알림을 HTML 메시지로 포맷합니다.
    pub fn format_message(&self, notification: &Notification) -> String {
        let priority_emoji = match notification.priority {
            NotificationPriority::Low => "ℹ️",
            NotificationPriority::Normal => "📊",
            NotificationPriority::High => "⚠️",
            NotificationPriority::Critical => "🚨",
        };

        let content = match &notification.event {
            NotificationEvent::Message { text } => escape_html(text),

            NotificationEvent::Critical {
                title,
                message,
                error,
            } => format!(
                "<b>{}</b>\n\n{}\n\n에러: <code>{}</code>",
                escape_html(title),
                escape_html(message),
                escape_html(error)
            ),

            NotificationEvent::PortfolioReport {
                lines,
                total_value,
                total_pnl,
                missing,
            } => {
                let mut body = String::from("<b>포트폴리오 현황</b>\n");
                for line in lines {
                    let change = line
                        .change_percent
                        .map(|c| format!(" ({}{}%)", sign(c), c))
                        .unwrap_or_default();
                    let _ = write!(
                        body,
                        "\n<code>{}</code> {}{} × {} = {} / 손익 {}{}",
                        escape_html(&line.ticker),
                        line.price,
                        change,
                        line.quantity,
                        line.market_value,
                        sign(line.unrealized_pnl),
                        line.unrealized_pnl
                    );
                }
                let _ = write!(
                    body,
                    "\n\n평가금액: <b>{}</b>\n평가손익: <b>{}{}</b>",
                    total_value,
                    sign(*total_pnl),
                    total_pnl
                );
                if !missing.is_empty() {
                    let _ = write!(body, "\n시세 없음: {}", escape_html(&missing.join(", ")));
                }
                body
            }
        };

        format!("{priority_emoji} {content}")
    }

    async fn send_message(&self, text: &str) -> NotificationResult<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base, self.config.bot_token
        );

        let params = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        debug!(chat_id = %self.config.chat_id, "Telegram 메시지 전송");

        let response = self.client.post(&url).json(&params).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 {
            warn!("Telegram rate limited");
            return Err(NotificationError::RateLimited(60));
        }

        error!(status = %status, body = %body, "Telegram 메시지 전송 실패");
        Err(NotificationError::SendFailed(format!(
            "HTTP {}: {}",
            status, body
        )))
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("Telegram notifications are disabled, skipping");
            return Ok(());
        }

        let message = self.format_message(notification);
        self.send_message(&message).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

fn sign(value: Decimal) -> &'static str {
    if value > Decimal::ZERO {
        "+"
    } else {
        ""
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
