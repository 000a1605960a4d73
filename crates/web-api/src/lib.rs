//! Web API 层。
//!
//! 提供 Axum 路由和 WebSocket 网关，将请求委托给应用层的聊天服务。

mod auth;
mod destination;
mod error;
mod extract;
mod frames;
mod gateway;
mod routes;
mod state;
mod ws_connection;

pub use auth::{AuthMember, Claims, JwtService};
pub use config::{JwtConfig, WebSocketConfig};
pub use destination::{parse_room_destination, room_destination};
pub use error::{ApiError, ErrorBody};
pub use extract::{ApiPath, ApiQuery};
pub use frames::{ClientFrame, SendBody, ServerFrame};
pub use routes::router;
pub use state::AppState;
pub use ws_connection::VerifiedIdentity;
