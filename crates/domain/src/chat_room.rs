use crate::errors::DomainError;
use crate::value_objects::{MemberId, RoomId, Timestamp};

/// 一对一交易聊天室，参与者在创建时固定为卖家和买家。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub seller_id: MemberId,
    pub buyer_id: MemberId,
    pub created_at: Timestamp,
    /// 最近一条消息的发送时间
    pub updated_at: Timestamp,
}

impl ChatRoom {
    pub fn is_participant(&self, member_id: MemberId) -> bool {
        self.seller_id == member_id || self.buyer_id == member_id
    }

    /// 返回对方参与者；非参与者返回 `None`。
    pub fn counterpart(&self, member_id: MemberId) -> Option<MemberId> {
        if member_id == self.seller_id {
            Some(self.buyer_id)
        } else if member_id == self.buyer_id {
            Some(self.seller_id)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [MemberId; 2] {
        [self.seller_id, self.buyer_id]
    }

    pub fn ensure_participant(&self, member_id: MemberId) -> Result<(), DomainError> {
        if self.is_participant(member_id) {
            Ok(())
        } else {
            Err(DomainError::ParticipantNotFound)
        }
    }

    pub fn record_activity(&mut self, at: Timestamp) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }

    pub fn pair_key(&self) -> (MemberId, MemberId) {
        pair_key(self.seller_id, self.buyer_id)
    }
}

/// 待创建的聊天室，ID 由存储层分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatRoom {
    pub seller_id: MemberId,
    pub buyer_id: MemberId,
    pub created_at: Timestamp,
}

impl NewChatRoom {
    pub fn new(
        seller_id: MemberId,
        buyer_id: MemberId,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if seller_id == buyer_id {
            return Err(DomainError::InvalidParticipants);
        }
        Ok(Self {
            seller_id,
            buyer_id,
            created_at,
        })
    }

    pub fn pair_key(&self) -> (MemberId, MemberId) {
        pair_key(self.seller_id, self.buyer_id)
    }

    pub fn into_room(self, id: RoomId) -> ChatRoom {
        ChatRoom {
            id,
            seller_id: self.seller_id,
            buyer_id: self.buyer_id,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// 无序参与者对的规范化键：(较小ID, 较大ID)。
pub fn pair_key(a: MemberId, b: MemberId) -> (MemberId, MemberId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
