//! 领域模型错误定义
//!
//! 领域层只关心业务规则是否被违反，存储层的失败统一收敛到 [`RepositoryError`]。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// 卖家和买家不能是同一个会员
    #[error("seller and buyer must be different members")]
    InvalidParticipants,

    #[error("chat room not found")]
    RoomNotFound,

    #[error("chat message not found")]
    MessageNotFound,

    #[error("chat member not found")]
    MemberNotFound,

    /// 会员存在，但不是该聊天室的参与者
    #[error("member is not a participant of the chat room")]
    ParticipantNotFound,

    #[error("invalid paging parameter: {reason}")]
    InvalidPaging { reason: String },
}

impl DomainError {
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_paging(reason: impl Into<String>) -> Self {
        Self::InvalidPaging {
            reason: reason.into(),
        }
    }
}

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("entity not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("entity conflict")]
    Conflict,

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
