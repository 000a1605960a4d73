use std::sync::Arc;

use domain::{
    ChatRoom, DomainError, Member, MemberId, MessageContent, MessageId, NewChatRoom, NewMessage,
    PageRequest, RoomId,
};

use crate::{
    clock::Clock,
    dto::{
        DeliveredMessage, MessageDto, MessagePageDto, ParticipantPresenceDto, PresenceDto,
        ReadReceiptDto, RoomDto, RoomSummaryDto, UnreadCountDto,
    },
    error::ApplicationError,
    presence::SessionTracker,
    repository::{ChatRoomRepository, MemberRepository, MessageRepository, ParticipantRepository},
};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub seller_id: MemberId,
    pub buyer_id: MemberId,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub room_id: RoomId,
    pub sender_id: MemberId, // 必须来自握手时绑定的身份
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ListMessagesRequest {
    pub room_id: RoomId,
    pub reader_id: MemberId,
    pub before: Option<MessageId>,
    pub limit: Option<u32>,
}

pub struct ChatServiceDependencies {
    pub member_repository: Arc<dyn MemberRepository>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub participant_repository: Arc<dyn ParticipantRepository>,
    pub sessions: Arc<SessionTracker>,
    pub clock: Arc<dyn Clock>,
}

/// 聊天核心用例：建房、发消息、已读回执、未读计数。
///
/// 所有会修改数据的操作都委托给仓储的单个事务方法完成，
/// 服务本身只负责校验顺序和错误映射。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.deps.sessions
    }

    /// 握手和接口鉴权时解析会员
    pub async fn find_member(&self, member_id: MemberId) -> Result<Member, ApplicationError> {
        self.deps
            .member_repository
            .find_by_id(member_id)
            .await?
            .ok_or_else(|| DomainError::MemberNotFound.into())
    }

    async fn find_room(&self, room_id: RoomId) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }

    /// 依次校验聊天室存在、会员存在、会员属于该聊天室。
    async fn participant_room(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<(ChatRoom, Member), ApplicationError> {
        let room = self.find_room(room_id).await?;
        let member = self.find_member(member_id).await?;
        room.ensure_participant(member.id)?;
        Ok((room, member))
    }

    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<RoomDto, ApplicationError> {
        let new_room = NewChatRoom::new(request.seller_id, request.buyer_id, self.deps.clock.now())?;
        self.find_member(request.seller_id).await?;
        self.find_member(request.buyer_id).await?;

        let (room, created) = self.deps.room_repository.find_or_create(new_room).await?;
        if created {
            tracing::info!(
                room_id = %room.id,
                seller_id = %room.seller_id,
                buyer_id = %room.buyer_id,
                "聊天室已创建"
            );
        } else {
            tracing::debug!(room_id = %room.id, "复用已有聊天室");
        }
        Ok(RoomDto::from(&room))
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<RoomDto, ApplicationError> {
        let room = self.find_room(room_id).await?;
        Ok(RoomDto::from(&room))
    }

    /// 订阅聊天室推送前的校验：只有参与者能收到该聊天室的消息。
    pub async fn ensure_participant(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<(), ApplicationError> {
        self.participant_room(room_id, member_id).await.map(|_| ())
    }

    /// 指定会员时返回其参与的聊天室，否则返回全部。
    pub async fn list_rooms(
        &self,
        member_id: Option<MemberId>,
    ) -> Result<Vec<RoomDto>, ApplicationError> {
        let rooms = match member_id {
            Some(member_id) => {
                self.find_member(member_id).await?;
                self.deps.room_repository.list_by_member(member_id).await?
            }
            None => self.deps.room_repository.list_all().await?,
        };
        Ok(rooms.iter().map(RoomDto::from).collect())
    }

    /// 聊天列表：对方信息、最后一条消息、未读数、对方是否在线。
    pub async fn list_room_summaries(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<RoomSummaryDto>, ApplicationError> {
        self.find_member(member_id).await?;
        let rooms = self.deps.room_repository.list_by_member(member_id).await?;

        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let Some(counterpart_id) = room.counterpart(member_id) else {
                continue;
            };
            let counterpart = self
                .deps
                .member_repository
                .find_by_id(counterpart_id)
                .await?;
            let last = self.deps.message_repository.latest_in_room(room.id).await?;
            let unread_count = self
                .deps
                .message_repository
                .count_unread_excluding_sender(room.id, member_id)
                .await?;

            summaries.push(RoomSummaryDto {
                room_id: room.id,
                counterpart_id,
                counterpart_name: counterpart.map(|member| member.name),
                last_message: last.as_ref().map(|m| m.content.as_str().to_owned()),
                last_message_at: last.as_ref().map(|m| m.sent_at),
                unread_count,
                counterpart_online: self.deps.sessions.is_user_connected(room.id, counterpart_id),
            });
        }
        Ok(summaries)
    }

    /// 校验并持久化一条消息。调用方只能在本方法成功返回后再广播。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<DeliveredMessage, ApplicationError> {
        let (room, sender) = self
            .participant_room(request.room_id, request.sender_id)
            .await?;
        let content = MessageContent::new(request.content)?;
        let recipient_id = room
            .counterpart(sender.id)
            .ok_or(DomainError::ParticipantNotFound)?;

        let message = self
            .deps
            .message_repository
            .append(NewMessage::new(
                room.id,
                sender.id,
                content,
                self.deps.clock.now(),
            ))
            .await?;

        tracing::info!(
            room_id = %room.id,
            message_id = %message.id,
            sender_id = %sender.id,
            "消息已保存"
        );

        Ok(DeliveredMessage {
            message: MessageDto::from(&message),
            recipient_id,
            sender_name: sender.name,
        })
    }

    /// 幂等：已读消息原样返回，否则由任一参与者标记为已读。
    pub async fn mark_message_read(
        &self,
        message_id: MessageId,
        reader_id: MemberId,
    ) -> Result<MessageDto, ApplicationError> {
        let mut message = self
            .deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or(DomainError::MessageNotFound)?;
        let (room, reader) = self.participant_room(message.room_id, reader_id).await?;

        if message.is_read {
            return Ok(MessageDto::from(&message));
        }

        let marked = self
            .deps
            .message_repository
            .mark_read(room.id, reader.id, vec![message.id])
            .await?;
        // marked == 0 说明并发的另一次回执已经先完成了标记
        message.mark_read();

        tracing::debug!(room_id = %room.id, message_id = %message.id, marked, "消息已读");
        Ok(MessageDto::from(&message))
    }

    /// 把聊天室内对方发来的所有未读消息标记为已读，返回标记条数。
    pub async fn mark_all_read_in_room(
        &self,
        room_id: RoomId,
        reader_id: MemberId,
    ) -> Result<ReadReceiptDto, ApplicationError> {
        let (room, reader) = self.participant_room(room_id, reader_id).await?;

        let unread = self
            .deps
            .message_repository
            .list_unread_excluding_sender(room.id, reader.id)
            .await?;
        if unread.is_empty() {
            return Ok(ReadReceiptDto::for_room(room.id, reader.id, 0));
        }

        let ids = unread.iter().map(|message| message.id).collect();
        let marked = self
            .deps
            .message_repository
            .mark_read(room.id, reader.id, ids)
            .await?;

        tracing::info!(room_id = %room.id, reader_id = %reader.id, marked, "聊天室消息已全部已读");
        Ok(ReadReceiptDto::for_room(room.id, reader.id, marked))
    }

    pub async fn unread_count(&self, reader_id: MemberId) -> Result<UnreadCountDto, ApplicationError> {
        let reader = self.find_member(reader_id).await?;
        let unread_count = self
            .deps
            .message_repository
            .count_unread_for_participant(reader.id)
            .await?;
        Ok(UnreadCountDto {
            member_id: reader.id,
            room_id: None,
            unread_count,
        })
    }

    pub async fn unread_count_in_room(
        &self,
        room_id: RoomId,
        reader_id: MemberId,
    ) -> Result<UnreadCountDto, ApplicationError> {
        let (room, reader) = self.participant_room(room_id, reader_id).await?;
        let unread_count = self
            .deps
            .message_repository
            .count_unread_excluding_sender(room.id, reader.id)
            .await?;
        Ok(UnreadCountDto {
            member_id: reader.id,
            room_id: Some(room.id),
            unread_count,
        })
    }

    /// 游标分页读取历史消息，页内升序。
    pub async fn list_messages(
        &self,
        request: ListMessagesRequest,
    ) -> Result<MessagePageDto, ApplicationError> {
        let page = PageRequest::new(request.before, request.limit)?;
        let (room, _) = self
            .participant_room(request.room_id, request.reader_id)
            .await?;

        // 多取一条用来判断是否还有更早的消息
        let mut messages = self
            .deps
            .message_repository
            .list_page(room.id, page.before, page.limit + 1)
            .await?;
        let has_more = messages.len() > page.limit as usize;
        if has_more {
            messages.remove(0);
        }
        let next_cursor = if has_more {
            messages.first().map(|message| message.id)
        } else {
            None
        };

        Ok(MessagePageDto {
            messages: messages.iter().map(MessageDto::from).collect(),
            has_more,
            next_cursor,
        })
    }

    /// 聊天室双方的在线状态和读取游标
    pub async fn room_presence(
        &self,
        room_id: RoomId,
        reader_id: MemberId,
    ) -> Result<PresenceDto, ApplicationError> {
        let (room, _) = self.participant_room(room_id, reader_id).await?;
        let participants = self.deps.participant_repository.list(room.id).await?;
        Ok(PresenceDto {
            room_id: room.id,
            participants: participants
                .iter()
                .map(|participant| {
                    let online = self
                        .deps
                        .sessions
                        .is_user_connected(room.id, participant.member_id);
                    ParticipantPresenceDto::new(participant, online)
                })
                .collect(),
        })
    }
}
