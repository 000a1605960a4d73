use domain::{ChatRoom, MemberId, Message, MessageId, RoomId, RoomParticipant, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    pub room_id: RoomId,
    pub seller_id: MemberId,
    pub buyer_id: MemberId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&ChatRoom> for RoomDto {
    fn from(room: &ChatRoom) -> Self {
        Self {
            room_id: room.id,
            seller_id: room.seller_id,
            buyer_id: room.buyer_id,
            created_at: room.created_at,
            updated_at: room.updated_at,
        }
    }
}

/// 广播和接口返回共用的消息表示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub message_id: MessageId,
    pub room_id: RoomId,
    pub sender_id: MemberId,
    pub content: String,
    pub read: bool,
    pub sent_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content.as_str().to_owned(),
            read: message.is_read,
            sent_at: message.sent_at,
        }
    }
}

/// `send_message` 的结果：已持久化的消息，加上推送判断需要的上下文。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub message: MessageDto,
    pub recipient_id: MemberId,
    pub sender_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptDto {
    pub message_id: Option<MessageId>,
    pub room_id: Option<RoomId>,
    pub member_id: MemberId,
    pub read_count: u64,
    pub success: bool,
}

impl ReadReceiptDto {
    pub fn for_message(message: &MessageDto, member_id: MemberId) -> Self {
        Self {
            message_id: Some(message.message_id),
            room_id: Some(message.room_id),
            member_id,
            read_count: u64::from(message.read),
            success: message.read,
        }
    }

    pub fn for_room(room_id: RoomId, member_id: MemberId, read_count: u64) -> Self {
        Self {
            message_id: None,
            room_id: Some(room_id),
            member_id,
            read_count,
            success: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountDto {
    pub member_id: MemberId,
    pub room_id: Option<RoomId>,
    pub unread_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePageDto {
    /// 升序
    pub messages: Vec<MessageDto>,
    pub has_more: bool,
    /// 下一页请求的 `before` 参数
    pub next_cursor: Option<MessageId>,
}

/// 聊天列表中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummaryDto {
    pub room_id: RoomId,
    pub counterpart_id: MemberId,
    pub counterpart_name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<Timestamp>,
    pub unread_count: u64,
    pub counterpart_online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPresenceDto {
    pub member_id: MemberId,
    pub online: bool,
    pub last_read_message: Option<MessageId>,
}

impl ParticipantPresenceDto {
    pub fn new(participant: &RoomParticipant, online: bool) -> Self {
        Self {
            member_id: participant.member_id,
            online,
            last_read_message: participant.last_read_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceDto {
    pub room_id: RoomId,
    pub participants: Vec<ParticipantPresenceDto>,
}
