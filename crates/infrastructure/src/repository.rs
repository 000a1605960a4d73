use std::sync::Arc;

use application::repository::{
    ChatRoomRepository, MemberRepository, MessageRepository, ParticipantRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatRoom, Member, MemberId, Message, MessageContent, MessageId, NewChatRoom, NewMessage,
    RepositoryError, RoomId, RoomParticipant,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

const ROOM_COLUMNS: &str = "id, seller_id, buyer_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, content, is_read, sent_at";

#[derive(Debug, FromRow)]
struct MemberRecord {
    id: i64,
    name: String,
}

impl From<MemberRecord> for Member {
    fn from(value: MemberRecord) -> Self {
        Member::new(MemberId::from(value.id), value.name)
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: i64,
    seller_id: i64,
    buyer_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoomRecord> for ChatRoom {
    fn from(value: RoomRecord) -> Self {
        ChatRoom {
            id: RoomId::from(value.id),
            seller_id: MemberId::from(value.seller_id),
            buyer_id: MemberId::from(value.buyer_id),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    room_id: i64,
    member_id: i64,
    joined_at: DateTime<Utc>,
    last_read_message_id: Option<i64>,
}

impl From<ParticipantRecord> for RoomParticipant {
    fn from(value: ParticipantRecord) -> Self {
        RoomParticipant {
            room_id: RoomId::from(value.room_id),
            member_id: MemberId::from(value.member_id),
            joined_at: value.joined_at,
            last_read_message: value.last_read_message_id.map(MessageId::from),
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: String,
    is_read: bool,
    sent_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::from(value.room_id),
            sender_id: MemberId::from(value.sender_id),
            content,
            is_read: value.is_read,
            sent_at: value.sent_at,
        })
    }
}

fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>, RepositoryError> {
    records.into_iter().map(Message::try_from).collect()
}

#[derive(Clone)]
pub struct PgMemberRepository {
    pool: PgPool,
}

impl PgMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberRepository for PgMemberRepository {
    async fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, RepositoryError> {
        let record =
            sqlx::query_as::<_, MemberRecord>("SELECT id, name FROM members WHERE id = $1")
                .bind(i64::from(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(record.map(Member::from))
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(ChatRoom::from))
    }

    async fn find_by_participants(
        &self,
        a: MemberId,
        b: MemberId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let (low, high) = domain::pair_key(a, b);
        let record = sqlx::query_as::<_, RoomRecord>(&format!(
            r#"
            SELECT {ROOM_COLUMNS} FROM chat_rooms
            WHERE LEAST(seller_id, buyer_id) = $1 AND GREATEST(seller_id, buyer_id) = $2
            "#
        ))
        .bind(i64::from(low))
        .bind(i64::from(high))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(ChatRoom::from))
    }

    async fn find_or_create(
        &self,
        room: NewChatRoom,
    ) -> Result<(ChatRoom, bool), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 依赖无序参与者对上的唯一索引：并发插入时后到者阻塞到先到者提交，然后什么都不做
        let inserted = sqlx::query_as::<_, RoomRecord>(&format!(
            r#"
            INSERT INTO chat_rooms (seller_id, buyer_id, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT DO NOTHING
            RETURNING {ROOM_COLUMNS}
            "#
        ))
        .bind(i64::from(room.seller_id))
        .bind(i64::from(room.buyer_id))
        .bind(room.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let Some(record) = inserted else {
            tx.rollback().await.map_err(map_sqlx_err)?;
            let existing = self
                .find_by_participants(room.seller_id, room.buyer_id)
                .await?
                .ok_or(RepositoryError::Conflict)?;
            return Ok((existing, false));
        };

        let created = ChatRoom::from(record);
        sqlx::query(
            r#"
            INSERT INTO chat_room_participants (room_id, member_id, joined_at)
            VALUES ($1, $2, $4), ($1, $3, $4)
            "#,
        )
        .bind(i64::from(created.id))
        .bind(i64::from(created.seller_id))
        .bind(i64::from(created.buyer_id))
        .bind(created.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok((created, true))
    }

    async fn list_by_member(&self, member_id: MemberId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(&format!(
            r#"
            SELECT {ROOM_COLUMNS} FROM chat_rooms
            WHERE seller_id = $1 OR buyer_id = $1
            ORDER BY updated_at DESC, id DESC
            "#
        ))
        .bind(i64::from(member_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(ChatRoom::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms ORDER BY updated_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(ChatRoom::from).collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 先锁住聊天室行，同时确认它存在；ID 与发送时间在同一把行锁下确定
        let previous: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT updated_at FROM chat_rooms WHERE id = $1 FOR UPDATE")
                .bind(i64::from(message.room_id))
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        let Some(previous) = previous else {
            return Err(RepositoryError::NotFound);
        };
        let message = message.sequenced_after(previous);

        sqlx::query("UPDATE chat_rooms SET updated_at = $2 WHERE id = $1")
            .bind(i64::from(message.room_id))
            .bind(message.sent_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO chat_messages (room_id, sender_id, content, is_read, sent_at)
            VALUES ($1, $2, $3, FALSE, $4)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(i64::from(message.room_id))
        .bind(i64::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.sent_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Message::try_from).transpose()
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM chat_messages
            WHERE room_id = $1
            ORDER BY sent_at ASC, id ASC
            "#
        ))
        .bind(i64::from(room_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn list_page(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM chat_messages
                WHERE room_id = $1 AND ($2::BIGINT IS NULL OR id < $2)
                ORDER BY sent_at DESC, id DESC
                LIMIT $3
            ) AS page
            ORDER BY sent_at ASC, id ASC
            "#
        ))
        .bind(i64::from(room_id))
        .bind(before.map(i64::from))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn latest_in_room(&self, room_id: RoomId) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM chat_messages
            WHERE room_id = $1
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(i64::from(room_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Message::try_from).transpose()
    }

    async fn list_unread_excluding_sender(
        &self,
        room_id: RoomId,
        excluded_sender: MemberId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM chat_messages
            WHERE room_id = $1 AND sender_id <> $2 AND is_read = FALSE
            ORDER BY sent_at ASC, id ASC
            "#
        ))
        .bind(i64::from(room_id))
        .bind(i64::from(excluded_sender))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        into_messages(records)
    }

    async fn count_unread_excluding_sender(
        &self,
        room_id: RoomId,
        excluded_sender: MemberId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chat_messages
            WHERE room_id = $1 AND sender_id <> $2 AND is_read = FALSE
            "#,
        )
        .bind(i64::from(room_id))
        .bind(i64::from(excluded_sender))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(to_count(count))
    }

    async fn count_unread_for_participant(
        &self,
        member_id: MemberId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chat_messages m
            JOIN chat_rooms r ON r.id = m.room_id
            WHERE (r.seller_id = $1 OR r.buyer_id = $1)
              AND m.sender_id <> $1
              AND m.is_read = FALSE
            "#,
        )
        .bind(i64::from(member_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(to_count(count))
    }

    async fn mark_read(
        &self,
        room_id: RoomId,
        reader: MemberId,
        message_ids: Vec<MessageId>,
    ) -> Result<u64, RepositoryError> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<i64> = message_ids.into_iter().map(i64::from).collect();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let (marked, newest): (i64, Option<i64>) = sqlx::query_as(
            r#"
            WITH marked AS (
                UPDATE chat_messages SET is_read = TRUE
                WHERE room_id = $1
                  AND is_read = FALSE
                  AND id = ANY($2)
                RETURNING id
            )
            SELECT COUNT(*), MAX(id) FROM marked
            "#,
        )
        .bind(i64::from(room_id))
        .bind(&ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(newest) = newest {
            sqlx::query(
                r#"
                UPDATE chat_room_participants
                SET last_read_message_id = GREATEST(COALESCE(last_read_message_id, 0), $3)
                WHERE room_id = $1 AND member_id = $2
                "#,
            )
            .bind(i64::from(room_id))
            .bind(i64::from(reader))
            .bind(newest)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(to_count(marked))
    }
}

#[derive(Clone)]
pub struct PgParticipantRepository {
    pool: PgPool,
}

impl PgParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParticipantRepository for PgParticipantRepository {
    async fn find(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<Option<RoomParticipant>, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT room_id, member_id, joined_at, last_read_message_id
            FROM chat_room_participants
            WHERE room_id = $1 AND member_id = $2
            "#,
        )
        .bind(i64::from(room_id))
        .bind(i64::from(member_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(RoomParticipant::from))
    }

    async fn list(&self, room_id: RoomId) -> Result<Vec<RoomParticipant>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT room_id, member_id, joined_at, last_read_message_id
            FROM chat_room_participants
            WHERE room_id = $1
            ORDER BY member_id
            "#,
        )
        .bind(i64::from(room_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(RoomParticipant::from).collect())
    }
}

#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub member_repository: Arc<PgMemberRepository>,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub participant_repository: Arc<PgParticipantRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            member_repository: Arc::new(PgMemberRepository::new(pool.clone())),
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            participant_repository: Arc::new(PgParticipantRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    tracing::info!(max_connections, "数据库连接池已建立");
    Ok(pool)
}
