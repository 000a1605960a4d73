//! WebSocket 文本帧协议，按 `type` 字段区分。
//!
//! 帧里不携带身份，发送者始终是握手时绑定的会员。

use application::MessageDto;
use domain::MemberId;
use serde::{Deserialize, Serialize};

/// 客户端 -> 服务端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { destination: String },
    Unsubscribe { destination: String },
    Send { destination: String, body: SendBody },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBody {
    /// 可选；出现时必须与握手身份一致
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<MemberId>,
    pub content: String,
}

/// 服务端 -> 客户端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Message {
        destination: String,
        body: MessageDto,
    },
    Receipt {
        destination: String,
    },
    Error {
        code: String,
        message: String,
    },
    Pong,
}

impl ServerFrame {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
