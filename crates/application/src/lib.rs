//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、事务边界、
//! 以及对外部适配器（存储、消息广播、离线推送）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod local_broadcast;
pub mod memory;
pub mod notifier;
pub mod presence;
pub mod repository;
pub mod services;

pub use broadcaster::{BroadcastError, MessageBroadcast, MessageBroadcaster};
pub use clock::{Clock, SystemClock};
pub use dto::{
    DeliveredMessage, MessageDto, MessagePageDto, ParticipantPresenceDto, PresenceDto,
    ReadReceiptDto, RoomDto, RoomSummaryDto, UnreadCountDto,
};
pub use error::ApplicationError;
pub use local_broadcast::{LocalMessageBroadcaster, MessageStream};
pub use memory::MemoryStorage;
pub use notifier::{ChatNotification, LogPushNotifier, NotifyError, OfflinePushGate, PushNotifier};
pub use presence::SessionTracker;
pub use repository::{
    ChatRoomRepository, MemberRepository, MessageRepository, ParticipantRepository,
};
pub use services::{
    ChatService, ChatServiceDependencies, CreateRoomRequest, ListMessagesRequest,
    SendMessageRequest,
};
