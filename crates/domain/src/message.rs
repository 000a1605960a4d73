use crate::errors::DomainError;
use crate::value_objects::{MemberId, MessageContent, MessageId, RoomId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: MemberId,
    pub content: MessageContent,
    /// 只会从 false 变为 true
    pub is_read: bool,
    pub sent_at: Timestamp,
}

impl Message {
    /// 标记为已读，返回本次调用是否真正改变了状态。
    pub fn mark_read(&mut self) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        true
    }

    /// 对 `reader` 而言是否属于未读消息：自己发送的消息永远不算未读。
    pub fn is_unread_for(&self, reader: MemberId) -> bool {
        !self.is_read && self.sender_id != reader
    }
}

/// 待写入的消息，ID 由存储层分配，初始为未读。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: MemberId,
    pub content: MessageContent,
    pub sent_at: Timestamp,
}

impl NewMessage {
    pub fn new(
        room_id: RoomId,
        sender_id: MemberId,
        content: MessageContent,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            room_id,
            sender_id,
            content,
            sent_at,
        }
    }

    /// 保证发送时间晚于聊天室内上一条消息。
    ///
    /// 存储层在分配 ID 的同一临界区内调用，使 ID 顺序与 `sent_at` 顺序一致。
    pub fn sequenced_after(mut self, previous: Timestamp) -> Self {
        if self.sent_at <= previous {
            self.sent_at = previous + chrono::Duration::microseconds(1);
        }
        self
    }

    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            content: self.content,
            is_read: false,
            sent_at: self.sent_at,
        }
    }
}

/// 基于游标的历史消息分页参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 只返回 ID 小于该值的消息
    pub before: Option<MessageId>,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 30;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(before: Option<MessageId>, limit: Option<u32>) -> Result<Self, DomainError> {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(DomainError::invalid_paging(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        if let Some(cursor) = before {
            if cursor.0 <= 0 {
                return Err(DomainError::invalid_paging("before must be positive"));
            }
        }
        Ok(Self { before, limit })
    }
}
