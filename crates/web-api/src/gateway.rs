//! WebSocket 握手入口
//!
//! 身份只在握手时校验一次：token 缺失或无效返回 401，会员不存在返回 404，
//! 两种情况都不会升级连接。

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::bearer_token,
    error::ApiError,
    state::AppState,
    ws_connection::{VerifiedIdentity, WebSocketConnection},
};

#[derive(Debug, Deserialize)]
pub(crate) struct HandshakeQuery {
    token: Option<String>,
}

pub(crate) async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = verify_handshake(&state, query.token.as_deref(), &headers).await?;
    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(state, identity).run(socket)))
}

/// 查询参数里的 token 优先，其次是 Authorization 头
async fn verify_handshake(
    state: &AppState,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<VerifiedIdentity, ApiError> {
    let token = query_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers))
        .ok_or_else(|| ApiError::unauthorized("Missing identity token"))?;

    let member_id = state.jwt_service.verify_token(token)?;
    let member = state.chat_service.find_member(member_id).await.map_err(|err| {
        tracing::warn!(member_id = %member_id, error = %err, "握手会员校验失败");
        ApiError::from(err)
    })?;

    Ok(VerifiedIdentity {
        member_id: member.id,
        name: member.name,
    })
}

/// 降级传输使用的探测接口，不做身份校验
#[derive(Debug, Serialize)]
pub(crate) struct TransportInfo {
    websocket: bool,
    origins: Vec<&'static str>,
    cookie_needed: bool,
    entropy: u32,
}

pub(crate) async fn transport_info() -> Json<TransportInfo> {
    Json(TransportInfo {
        websocket: true,
        origins: vec!["*:*"],
        cookie_needed: false,
        entropy: rand::random::<u32>(),
    })
}
