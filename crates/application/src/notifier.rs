//! 离线推送
//!
//! 推送的实际派发由外部系统负责，这里只定义派发接口，
//! 以及"对方不在聊天室时才推送"的判断。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{MemberId, RoomId};
use thiserror::Error;

use crate::{dto::DeliveredMessage, presence::SessionTracker};

/// 推送正文最多保留的字符数
pub const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatNotification {
    pub recipient_id: MemberId,
    pub room_id: RoomId,
    pub sender_name: String,
    pub content: String,
}

impl ChatNotification {
    pub fn from_delivery(delivered: &DeliveredMessage) -> Self {
        Self {
            recipient_id: delivered.recipient_id,
            room_id: delivered.message.room_id,
            sender_name: delivered.sender_name.clone(),
            content: delivered.message.content.clone(),
        }
    }

    pub fn title(&self) -> String {
        format!("{} 发来新消息", self.sender_name)
    }

    pub fn body(&self) -> String {
        preview(&self.content, PREVIEW_CHARS)
    }
}

/// 按字符截断，超出部分以 `...` 结尾。
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push dispatch failed: {0}")]
    Dispatch(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify_chat(&self, notification: ChatNotification) -> Result<(), NotifyError>;
}

/// 只写日志的推送实现，用于没有接入推送服务的部署。
#[derive(Debug, Default)]
pub struct LogPushNotifier;

#[async_trait]
impl PushNotifier for LogPushNotifier {
    async fn notify_chat(&self, notification: ChatNotification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient_id = %notification.recipient_id,
            room_id = %notification.room_id,
            title = %notification.title(),
            body = %notification.body(),
            "推送通知"
        );
        Ok(())
    }
}

/// 消息广播之后调用：接收方没有订阅该聊天室时才派发推送。
pub struct OfflinePushGate {
    sessions: Arc<SessionTracker>,
    notifier: Arc<dyn PushNotifier>,
}

impl OfflinePushGate {
    pub fn new(sessions: Arc<SessionTracker>, notifier: Arc<dyn PushNotifier>) -> Self {
        Self { sessions, notifier }
    }

    /// 返回是否派发了推送。派发失败只记录日志，不影响消息发送结果。
    pub async fn dispatch(&self, delivered: &DeliveredMessage) -> bool {
        let room_id = delivered.message.room_id;
        if self
            .sessions
            .is_user_connected(room_id, delivered.recipient_id)
        {
            tracing::debug!(
                room_id = %room_id,
                recipient_id = %delivered.recipient_id,
                "接收方在线，跳过推送"
            );
            return false;
        }

        match self
            .notifier
            .notify_chat(ChatNotification::from_delivery(delivered))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    room_id = %room_id,
                    recipient_id = %delivered.recipient_id,
                    "推送派发失败"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::MessageId;

    use super::*;
    use crate::dto::MessageDto;

    fn delivered(content: &str) -> DeliveredMessage {
        DeliveredMessage {
            message: MessageDto {
                message_id: MessageId(1),
                room_id: RoomId(7),
                sender_id: MemberId(1),
                content: content.to_owned(),
                read: false,
                sent_at: Utc::now(),
            },
            recipient_id: MemberId(2),
            sender_name: "seller".to_owned(),
        }
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "가".repeat(60);
        let cut = preview(&long, 50);
        assert_eq!(cut.chars().count(), 53);
        assert!(cut.ends_with("..."));
        assert_eq!(preview("hello", 50), "hello");
        assert_eq!(preview(&"a".repeat(50), 50), "a".repeat(50));
    }

    #[tokio::test]
    async fn offline_recipient_gets_push() {
        let mut notifier = MockPushNotifier::new();
        notifier
            .expect_notify_chat()
            .withf(|n| n.recipient_id == MemberId(2) && n.room_id == RoomId(7))
            .times(1)
            .returning(|_| Ok(()));

        let gate = OfflinePushGate::new(Arc::new(SessionTracker::new()), Arc::new(notifier));
        assert!(gate.dispatch(&delivered("hi")).await);
    }

    #[tokio::test]
    async fn present_recipient_is_skipped() {
        let mut notifier = MockPushNotifier::new();
        notifier.expect_notify_chat().never();

        let sessions = Arc::new(SessionTracker::new());
        sessions.add_session(RoomId(7), MemberId(2));
        let gate = OfflinePushGate::new(sessions, Arc::new(notifier));
        assert!(!gate.dispatch(&delivered("hi")).await);
    }

    #[tokio::test]
    async fn dispatch_failure_is_swallowed() {
        let mut notifier = MockPushNotifier::new();
        notifier
            .expect_notify_chat()
            .times(1)
            .returning(|_| Err(NotifyError::Dispatch("token expired".into())));

        let gate = OfflinePushGate::new(Arc::new(SessionTracker::new()), Arc::new(notifier));
        assert!(!gate.dispatch(&delivered("hi")).await);
    }
}
