use async_trait::async_trait;
use domain::RoomId;
use thiserror::Error;

use crate::dto::MessageDto;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageBroadcast {
    pub room_id: RoomId,
    pub message: MessageDto,
}

impl MessageBroadcast {
    pub fn new(message: MessageDto) -> Self {
        Self {
            room_id: message.room_id,
            message,
        }
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 房间级广播。投递是尽力而为的：不等待接收方确认，也不重试。
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    /// 返回本次投递时的接收者数量
    async fn broadcast(&self, payload: MessageBroadcast) -> Result<usize, BroadcastError>;
}
