//! 交易聊天核心领域模型
//!
//! 包含会员、聊天室、消息、读取游标等实体，以及相关的业务校验规则。

pub mod chat_room;
pub mod errors;
pub mod member;
pub mod message;
pub mod room_participant;
pub mod value_objects;

pub use chat_room::{pair_key, ChatRoom, NewChatRoom};
pub use errors::{DomainError, RepositoryError};
pub use member::Member;
pub use message::{Message, NewMessage, PageRequest};
pub use room_participant::RoomParticipant;
pub use value_objects::{MemberId, MessageContent, MessageId, RoomId, Timestamp};
