//! # PriceWatch Notification
//!
//! 수집기 알림 채널.
//!
//! - `Notifier`: 여러 전송기로의 fire-and-forget 팬아웃 (`send`, `send_critical`)
//! - `TelegramSender`: Telegram Bot API 전송기
//!
//! 전송 실패는 로그로만 남기며 호출자에게 전파하지 않습니다.

pub mod notifier;
pub mod telegram;
pub mod types;

pub use notifier::*;
pub use telegram::*;
pub use types::*;
