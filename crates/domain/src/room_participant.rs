use crate::value_objects::{MemberId, MessageId, RoomId, Timestamp};

/// 参与者在某个聊天室中的读取游标。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RoomParticipant {
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub joined_at: Timestamp,
    pub last_read_message: Option<MessageId>,
}

impl RoomParticipant {
    pub fn new(room_id: RoomId, member_id: MemberId, joined_at: Timestamp) -> Self {
        Self {
            room_id,
            member_id,
            joined_at,
            last_read_message: None,
        }
    }

    /// 游标只前进不后退。
    pub fn record_last_read(&mut self, message_id: MessageId) {
        match self.last_read_message {
            Some(current) if current >= message_id => {}
            _ => self.last_read_message = Some(message_id),
        }
    }
}
