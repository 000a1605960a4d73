//! 存储端口。
//!
//! 每个会修改多行数据的操作都是一个完整的事务方法（如 `find_or_create`、`append`、
//! `mark_read`），实现方需要保证要么全部生效、要么全部回滚。

use async_trait::async_trait;
use domain::{
    ChatRoom, Member, MemberId, Message, MessageId, NewChatRoom, NewMessage, RepositoryError,
    RoomId, RoomParticipant,
};

/// 会员目录，由外部会员系统提供，只读。
#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, RepositoryError>;
}

#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 参与者顺序无关
    async fn find_by_participants(
        &self,
        a: MemberId,
        b: MemberId,
    ) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 按无序参与者对查找或创建聊天室，同时创建双方的读取游标。
    ///
    /// 返回 `(room, created)`；并发首次创建时只有一方会写入，另一方读回胜出的那一行。
    async fn find_or_create(
        &self,
        room: NewChatRoom,
    ) -> Result<(ChatRoom, bool), RepositoryError>;

    /// 按最近活动时间倒序
    async fn list_by_member(&self, member_id: MemberId) -> Result<Vec<ChatRoom>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ChatRoom>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 写入消息并刷新聊天室的最近活动时间，聊天室不存在时返回 `NotFound`。
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    /// 按 (sent_at, id) 升序
    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Message>, RepositoryError>;

    /// 取 `before` 之前最新的 `limit` 条，按升序返回。
    async fn list_page(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn latest_in_room(&self, room_id: RoomId) -> Result<Option<Message>, RepositoryError>;

    async fn list_unread_excluding_sender(
        &self,
        room_id: RoomId,
        excluded_sender: MemberId,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn count_unread_excluding_sender(
        &self,
        room_id: RoomId,
        excluded_sender: MemberId,
    ) -> Result<u64, RepositoryError>;

    /// 会员作为卖家或买家参与的所有聊天室中，对方发来的未读消息总数。
    async fn count_unread_for_participant(
        &self,
        member_id: MemberId,
    ) -> Result<u64, RepositoryError>;

    /// 将 `message_ids` 中属于该聊天室且仍未读的消息标记为已读，
    /// 并把 `reader` 的读取游标推进到其中最新的一条。返回实际标记的条数。
    ///
    /// 不按发送者过滤，批量场景由调用方先排除读者自己的消息。
    async fn mark_read(
        &self,
        room_id: RoomId,
        reader: MemberId,
        message_ids: Vec<MessageId>,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn find(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<Option<RoomParticipant>, RepositoryError>;

    async fn list(&self, room_id: RoomId) -> Result<Vec<RoomParticipant>, RepositoryError>;
}
