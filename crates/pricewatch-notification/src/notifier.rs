//! 다중 전송기 알림 팬아웃.
//!
//! 모든 메서드는 fire-and-forget입니다. 전송 실패는 `error!`로 기록하고
//! 호출자에게 돌려주지 않습니다.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::types::{Notification, NotificationEvent, NotificationPriority, NotificationSender};

/// 알림 관리자.
///
/// 활성화된 전송기가 하나도 없으면 알림 내용을 로그로만 남깁니다.
#[derive(Clone, Default)]
pub struct Notifier {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl Notifier {
    /// 전송기 없는 알림 관리자를 생성합니다 (로그 전용).
    pub fn new() -> Self {
        Self::default()
    }

    /// 전송기를 추가합니다.
    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    /// 활성화된 전송기 수
    pub fn enabled_senders(&self) -> usize {
        self.senders.iter().filter(|s| s.is_enabled()).count()
    }

    /// 일반 메시지를 전송합니다.
    pub async fn send(&self, message: &str) {
        let notification = Notification::new(NotificationEvent::Message {
            text: message.to_string(),
        });
        self.dispatch(&notification).await;
    }

    /// 긴급 알림을 전송합니다.
    pub async fn send_critical(
        &self,
        title: &str,
        message: &str,
        error: &(dyn Display + Sync),
    ) {
        let notification = Notification::new(NotificationEvent::Critical {
            title: title.to_string(),
            message: message.to_string(),
            error: error.to_string(),
        })
        .with_priority(NotificationPriority::Critical);
        self.dispatch(&notification).await;
    }

    /// 임의 이벤트를 전송합니다.
    pub async fn notify(&self, event: NotificationEvent, priority: NotificationPriority) {
        let notification = Notification::new(event).with_priority(priority);
        self.dispatch(&notification).await;
    }

    async fn dispatch(&self, notification: &Notification) {
        if self.enabled_senders() == 0 {
            info!(
                id = %notification.id,
                priority = ?notification.priority,
                event = ?notification.event,
                "알림 (전송기 없음, 로그 기록만)"
            );
            return;
        }

        for sender in self.senders.iter().filter(|s| s.is_enabled()) {
            if let Err(e) = sender.send(notification).await {
                error!(
                    sender = sender.name(),
                    id = %notification.id,
                    error = %e,
                    "알림 전송 실패"
                );
            }
        }

        if notification.priority == NotificationPriority::Critical {
            warn!(id = %notification.id, "긴급 알림 발송");
        }
    }
}
