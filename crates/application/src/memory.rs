//! 进程内存储
//!
//! 用于测试和 `memory` 存储模式。所有表放在一把读写锁之后，
//! 每个修改方法在整个执行期间持有写锁，相当于一个事务。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    pair_key, ChatRoom, Member, MemberId, Message, MessageId, NewChatRoom, NewMessage,
    RepositoryError, RoomId, RoomParticipant,
};
use tokio::sync::RwLock;

use crate::repository::{
    ChatRoomRepository, MemberRepository, MessageRepository, ParticipantRepository,
};

#[derive(Default)]
struct Tables {
    members: BTreeMap<MemberId, Member>,
    rooms: BTreeMap<RoomId, ChatRoom>,
    pairs: HashMap<(MemberId, MemberId), RoomId>,
    messages: BTreeMap<MessageId, Message>,
    participants: HashMap<(RoomId, MemberId), RoomParticipant>,
    next_member_id: i64,
    next_room_id: i64,
    next_message_id: i64,
}

impl Tables {
    fn room_messages(&self, room_id: RoomId) -> impl Iterator<Item = &Message> {
        self.messages
            .values()
            .filter(move |message| message.room_id == room_id)
    }

    fn member_rooms(&self, member_id: MemberId) -> impl Iterator<Item = &ChatRoom> {
        self.rooms
            .values()
            .filter(move |room| room.is_participant(member_id))
    }
}

/// 按 (sent_at, id) 排序，与数据库实现保持一致。
fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by(|a, b| (a.sent_at, a.id).cmp(&(b.sent_at, b.id)));
}

fn sort_by_activity(rooms: &mut [ChatRoom]) {
    rooms.sort_by(|a, b| (b.updated_at, b.id).cmp(&(a.updated_at, a.id)));
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 会员由外部系统管理，这里只提供测试和演示用的注册入口。
    pub async fn insert_member(&self, name: impl Into<String>) -> Member {
        let mut tables = self.tables.write().await;
        tables.next_member_id += 1;
        let member = Member::new(MemberId(tables.next_member_id), name);
        tables.members.insert(member.id, member.clone());
        member
    }
}

#[async_trait]
impl MemberRepository for MemoryStorage {
    async fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, RepositoryError> {
        Ok(self.tables.read().await.members.get(&id).cloned())
    }
}

#[async_trait]
impl ChatRoomRepository for MemoryStorage {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        Ok(self.tables.read().await.rooms.get(&id).cloned())
    }

    async fn find_by_participants(
        &self,
        a: MemberId,
        b: MemberId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .pairs
            .get(&pair_key(a, b))
            .and_then(|room_id| tables.rooms.get(room_id))
            .cloned())
    }

    async fn find_or_create(
        &self,
        room: NewChatRoom,
    ) -> Result<(ChatRoom, bool), RepositoryError> {
        let mut tables = self.tables.write().await;
        let key = room.pair_key();

        if let Some(existing) = tables.pairs.get(&key).and_then(|id| tables.rooms.get(id)) {
            return Ok((existing.clone(), false));
        }

        tables.next_room_id += 1;
        let room = room.into_room(RoomId(tables.next_room_id));
        for member_id in room.participants() {
            tables.participants.insert(
                (room.id, member_id),
                RoomParticipant::new(room.id, member_id, room.created_at),
            );
        }
        tables.pairs.insert(key, room.id);
        tables.rooms.insert(room.id, room.clone());
        Ok((room, true))
    }

    async fn list_by_member(&self, member_id: MemberId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rooms: Vec<ChatRoom> = tables.member_rooms(member_id).cloned().collect();
        sort_by_activity(&mut rooms);
        Ok(rooms)
    }

    async fn list_all(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rooms: Vec<ChatRoom> = tables.rooms.values().cloned().collect();
        sort_by_activity(&mut rooms);
        Ok(rooms)
    }
}

#[async_trait]
impl MessageRepository for MemoryStorage {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(previous) = tables.rooms.get(&message.room_id).map(|room| room.updated_at) else {
            return Err(RepositoryError::NotFound);
        };

        tables.next_message_id += 1;
        let message = message
            .sequenced_after(previous)
            .into_message(MessageId(tables.next_message_id));
        if let Some(room) = tables.rooms.get_mut(&message.room_id) {
            room.record_activity(message.sent_at);
        }
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables.room_messages(room_id).cloned().collect();
        sort_chronologically(&mut messages);
        Ok(messages)
    }

    async fn list_page(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .room_messages(room_id)
            .filter(|message| before.map_or(true, |cursor| message.id < cursor))
            .cloned()
            .collect();
        sort_chronologically(&mut messages);
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.split_off(skip))
    }

    async fn latest_in_room(&self, room_id: RoomId) -> Result<Option<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .room_messages(room_id)
            .max_by_key(|message| (message.sent_at, message.id))
            .cloned())
    }

    async fn list_unread_excluding_sender(
        &self,
        room_id: RoomId,
        excluded_sender: MemberId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .room_messages(room_id)
            .filter(|message| message.is_unread_for(excluded_sender))
            .cloned()
            .collect();
        sort_chronologically(&mut messages);
        Ok(messages)
    }

    async fn count_unread_excluding_sender(
        &self,
        room_id: RoomId,
        excluded_sender: MemberId,
    ) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .room_messages(room_id)
            .filter(|message| message.is_unread_for(excluded_sender))
            .count() as u64)
    }

    async fn count_unread_for_participant(
        &self,
        member_id: MemberId,
    ) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        let total = tables
            .member_rooms(member_id)
            .map(|room| {
                tables
                    .room_messages(room.id)
                    .filter(|message| message.is_unread_for(member_id))
                    .count() as u64
            })
            .sum();
        Ok(total)
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        reader: MemberId,
        message_ids: Vec<MessageId>,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.write().await;
        let mut marked = 0u64;
        let mut newest: Option<MessageId> = None;

        for id in message_ids {
            let Some(message) = tables.messages.get_mut(&id) else {
                continue;
            };
            if message.room_id != room_id {
                continue;
            }
            if message.mark_read() {
                marked += 1;
                newest = newest.max(Some(id));
            }
        }

        if let Some(newest) = newest {
            if let Some(cursor) = tables.participants.get_mut(&(room_id, reader)) {
                cursor.record_last_read(newest);
            }
        }
        Ok(marked)
    }
}

#[async_trait]
impl ParticipantRepository for MemoryStorage {
    async fn find(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<Option<RoomParticipant>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .participants
            .get(&(room_id, member_id))
            .cloned())
    }

    async fn list(&self, room_id: RoomId) -> Result<Vec<RoomParticipant>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut participants: Vec<RoomParticipant> = tables
            .participants
            .values()
            .filter(|participant| participant.room_id == room_id)
            .cloned()
            .collect();
        participants.sort_by_key(|participant| participant.member_id);
        Ok(participants)
    }
}
