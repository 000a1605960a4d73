use std::sync::Arc;

use application::{
    services::SendMessageRequest, ApplicationError, MessageBroadcast, MessageBroadcaster,
};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{MemberId, RoomId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    destination::{parse_room_destination, room_destination},
    error::classify,
    frames::{ClientFrame, SendBody, ServerFrame},
    state::AppState,
};

/// 握手时校验通过的身份，在整个连接生命周期内不变
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub member_id: MemberId,
    pub name: String,
}

/// WebSocket 连接管理器
///
/// 封装单个 WebSocket 连接的状态和逻辑：
/// - 订阅和退订聊天室
/// - 发送消息并广播给聊天室的所有订阅者
/// - 断开时清理在线状态
pub struct WebSocketConnection {
    state: AppState,
    identity: VerifiedIdentity,
}

/// WebSocket 写操作命令
///
/// 所有对 sender 和消息流的操作都经由同一个 channel 顺序执行，
/// 所以订阅回执发出时该聊天室的消息已经开始转发。
#[derive(Debug)]
enum WsCommand {
    Follow(RoomId),
    Unfollow(RoomId),
    Frame(ServerFrame),
    Pong(Vec<u8>),
}

impl WebSocketConnection {
    pub fn new(state: AppState, identity: VerifiedIdentity) -> Self {
        Self { state, identity }
    }

    /// 运行连接主循环，直到任一方向结束
    pub async fn run(self, socket: WebSocket) {
        let connection = Arc::new(self);
        let member_id = connection.identity.member_id;
        tracing::info!(
            member_id = %member_id,
            name = %connection.identity.name,
            "WebSocket 连接已建立"
        );

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);
        let mut message_stream = connection.state.broadcaster.subscribe();
        let topic_prefix = connection.state.websocket.topic_prefix.clone();

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(WsCommand::Follow(room_id)) => {
                            message_stream.follow(room_id);
                            continue;
                        }
                        Some(WsCommand::Unfollow(room_id)) => {
                            message_stream.unfollow(room_id);
                            continue;
                        }
                        Some(WsCommand::Frame(frame)) => frame,
                        Some(WsCommand::Pong(data)) => {
                            if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        None => break,
                    },
                    Some(broadcast) = message_stream.recv() => ServerFrame::Message {
                        destination: room_destination(&topic_prefix, broadcast.room_id),
                        body: broadcast.message,
                    },
                    else => break,
                };

                let payload = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize websocket frame");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                    tracing::debug!("WebSocket 写入失败，对端已断开");
                    break;
                }
            }
        });

        // 接收任务：按顺序处理客户端帧，同一连接内的消息保持发送顺序
        let handler = connection.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handler.handle_incoming(message, &cmd_tx).await.is_err() {
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        // 同一会员的所有在线记录一并清除
        let left = connection
            .state
            .chat_service
            .sessions()
            .remove_all_sessions(member_id);
        tracing::info!(
            member_id = %member_id,
            rooms = left.len(),
            "WebSocket 连接已断开，在线状态已清理"
        );
    }

    async fn handle_incoming(
        &self,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ConnectionClosed> {
        match message {
            WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) => self.handle_frame(frame, cmd_tx).await,
                Err(err) => {
                    tracing::debug!(error = %err, "无法解析客户端帧");
                    send_command(
                        cmd_tx,
                        WsCommand::Frame(ServerFrame::error("INVALID_FRAME", err.to_string())),
                    )
                    .await
                }
            },
            WsMessage::Ping(data) => send_command(cmd_tx, WsCommand::Pong(data.to_vec())).await,
            WsMessage::Pong(_) => Ok(()),
            WsMessage::Binary(_) => {
                tracing::debug!("忽略二进制帧");
                Ok(())
            }
            WsMessage::Close(_) => {
                tracing::debug!("WebSocket收到关闭消息");
                Err(ConnectionClosed)
            }
        }
    }

    async fn handle_frame(
        &self,
        frame: ClientFrame,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ConnectionClosed> {
        match frame {
            ClientFrame::Subscribe { destination } => self.subscribe(destination, cmd_tx).await,
            ClientFrame::Unsubscribe { destination } => self.unsubscribe(destination, cmd_tx).await,
            ClientFrame::Send { destination, body } => {
                match self.send(&destination, body).await {
                    Ok(()) => Ok(()),
                    Err(frame) => send_command(cmd_tx, WsCommand::Frame(frame)).await,
                }
            }
            ClientFrame::Ping => send_command(cmd_tx, WsCommand::Frame(ServerFrame::Pong)).await,
        }
    }

    async fn subscribe(
        &self,
        destination: String,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ConnectionClosed> {
        let member_id = self.identity.member_id;
        match parse_room_destination(&destination, &self.state.websocket.topic_prefix) {
            Some(room_id) => {
                if let Err(err) = self
                    .state
                    .chat_service
                    .ensure_participant(room_id, member_id)
                    .await
                {
                    return send_command(cmd_tx, WsCommand::Frame(error_frame(&err))).await;
                }
                send_command(cmd_tx, WsCommand::Follow(room_id)).await?;
                self.state
                    .chat_service
                    .sessions()
                    .add_session(room_id, member_id);
                tracing::info!(room_id = %room_id, member_id = %member_id, "已订阅聊天室");
            }
            None => {
                tracing::warn!(
                    destination = %destination,
                    member_id = %member_id,
                    "订阅目的地格式无效，跳过在线状态记录"
                );
            }
        }
        send_command(cmd_tx, WsCommand::Frame(ServerFrame::Receipt { destination })).await
    }

    async fn unsubscribe(
        &self,
        destination: String,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ConnectionClosed> {
        let member_id = self.identity.member_id;
        if let Some(room_id) =
            parse_room_destination(&destination, &self.state.websocket.topic_prefix)
        {
            send_command(cmd_tx, WsCommand::Unfollow(room_id)).await?;
            self.state
                .chat_service
                .sessions()
                .remove_session(room_id, member_id);
            tracing::info!(room_id = %room_id, member_id = %member_id, "已退订聊天室");
        }
        send_command(cmd_tx, WsCommand::Frame(ServerFrame::Receipt { destination })).await
    }

    /// 持久化成功后才广播；失败以错误帧的形式只返回给发送方
    async fn send(&self, destination: &str, body: SendBody) -> Result<(), ServerFrame> {
        let member_id = self.identity.member_id;
        let room_id = parse_room_destination(destination, &self.state.websocket.app_prefix)
            .ok_or_else(|| {
                ServerFrame::error(
                    "INVALID_DESTINATION",
                    format!("unsupported destination: {destination}"),
                )
            })?;
        if body.sender_id.is_some_and(|sender_id| sender_id != member_id) {
            tracing::warn!(room_id = %room_id, member_id = %member_id, "发送者与连接身份不一致");
            return Err(ServerFrame::error(
                "SENDER_MISMATCH",
                "senderId does not match the connection identity",
            ));
        }

        let delivered = self
            .state
            .chat_service
            .send_message(SendMessageRequest {
                room_id,
                sender_id: member_id,
                content: body.content,
            })
            .await
            .map_err(|err| error_frame(&err))?;

        match self
            .state
            .broadcaster
            .broadcast(MessageBroadcast::new(delivered.message.clone()))
            .await
        {
            Ok(receivers) => {
                tracing::debug!(room_id = %room_id, receivers, "消息已广播");
            }
            Err(err) => {
                // 消息已保存，客户端可以通过历史接口补齐
                tracing::warn!(error = %err, room_id = %room_id, "消息广播失败");
            }
        }

        // 推送不阻塞本连接后续帧的处理
        let push_gate = self.state.push_gate.clone();
        tokio::spawn(async move {
            push_gate.dispatch(&delivered).await;
        });
        Ok(())
    }
}

/// 发送任务已经结束，连接随之关闭
#[derive(Debug)]
struct ConnectionClosed;

async fn send_command(
    cmd_tx: &mpsc::Sender<WsCommand>,
    command: WsCommand,
) -> Result<(), ConnectionClosed> {
    cmd_tx.send(command).await.map_err(|_| ConnectionClosed)
}

fn error_frame(err: &ApplicationError) -> ServerFrame {
    let (_, code) = classify(err);
    ServerFrame::error(code, err.to_string())
}
