#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use application::{
    services::{ChatService, ChatServiceDependencies},
    ChatNotification, LocalMessageBroadcaster, MemoryStorage, NotifyError, OfflinePushGate,
    PushNotifier, SessionTracker, SystemClock,
};
use domain::{Member, MemberId, RoomId};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtConfig, JwtService, WebSocketConfig};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// 记录所有推送，供断言离线推送行为
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<ChatNotification>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<ChatNotification> {
        self.sent.lock().expect("notifier lock").clone()
    }

    /// 模拟响应缓慢的推送服务
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("notifier lock") = Some(delay);
    }
}

#[async_trait::async_trait]
impl PushNotifier for RecordingNotifier {
    async fn notify_chat(&self, notification: ChatNotification) -> Result<(), NotifyError> {
        let delay = *self.delay.lock().expect("notifier lock");
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.sent.lock().expect("notifier lock").push(notification);
        Ok(())
    }
}

pub struct TestServer {
    pub base_http: String,
    pub base_ws: String,
    pub storage: MemoryStorage,
    pub sessions: Arc<SessionTracker>,
    pub chat_service: Arc<ChatService>,
    pub jwt: Arc<JwtService>,
    pub pushes: Arc<RecordingNotifier>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let storage = MemoryStorage::new();
        let sessions = Arc::new(SessionTracker::new());
        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            member_repository: Arc::new(storage.clone()),
            room_repository: Arc::new(storage.clone()),
            message_repository: Arc::new(storage.clone()),
            participant_repository: Arc::new(storage.clone()),
            sessions: sessions.clone(),
            clock: Arc::new(SystemClock::new()),
        }));
        let pushes = Arc::new(RecordingNotifier::default());
        let push_gate = Arc::new(OfflinePushGate::new(sessions.clone(), pushes.clone()));
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "integration-test-secret-at-least-32-chars".to_string(),
            expiration_hours: 1,
        }));

        let state = AppState::new(
            chat_service.clone(),
            Arc::new(LocalMessageBroadcaster::default()),
            push_gate,
            jwt.clone(),
            WebSocketConfig::default(),
        );
        let app = router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // allow server to start
        sleep(Duration::from_millis(100)).await;

        Self {
            base_http: format!("http://{addr}"),
            base_ws: format!("ws://{addr}"),
            storage,
            sessions,
            chat_service,
            jwt,
            pushes,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn member(&self, name: &str) -> Member {
        self.storage.insert_member(name).await
    }

    pub fn token(&self, member_id: MemberId) -> String {
        self.jwt.generate_token(member_id).expect("token")
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_http, path)
    }

    pub async fn open_room(&self, seller: &Member, buyer: &Member) -> RoomId {
        let room: Value = reqwest::Client::new()
            .post(self.api("/chatrooms"))
            .json(&serde_json::json!({"sellerId": seller.id, "buyerId": buyer.id}))
            .send()
            .await
            .expect("create room")
            .json()
            .await
            .expect("room json");
        RoomId::from(room["roomId"].as_i64().expect("roomId"))
    }

    pub async fn connect(&self, member_id: MemberId) -> WsClient {
        let url = format!("{}/ws-chat?token={}", self.base_ws, self.token(member_id));
        let (socket, _) = connect_async(url).await.expect("websocket connect");
        socket
    }

    /// 轮询直到条件成立，断开连接后的清理是异步完成的
    pub async fn eventually(&self, condition: impl Fn(&SessionTracker) -> bool) -> bool {
        for _ in 0..40 {
            if condition(&self.sessions) {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub async fn send_frame(socket: &mut WsClient, frame: Value) {
    socket
        .send(TungsteniteMessage::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// 下一个文本帧，跳过控制帧
pub async fn next_frame(socket: &mut WsClient) -> Value {
    loop {
        let message = timeout(FRAME_TIMEOUT, socket.next())
            .await
            .expect("frame timeout")
            .expect("socket closed")
            .expect("socket error");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

/// 在短时间内没有收到任何文本帧
pub async fn expect_silence(socket: &mut WsClient) {
    let result = timeout(Duration::from_millis(300), async {
        loop {
            match socket.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = result {
        panic!("unexpected frame: {text}");
    }
}

pub async fn subscribe(socket: &mut WsClient, room_id: RoomId) {
    let destination = format!("/topic/room/{room_id}");
    send_frame(
        socket,
        serde_json::json!({"type": "subscribe", "destination": destination}),
    )
    .await;
    let receipt = next_frame(socket).await;
    assert_eq!(receipt["type"], "receipt", "{receipt}");
    assert_eq!(receipt["destination"], destination.as_str());
}

pub async fn send_chat(socket: &mut WsClient, room_id: RoomId, content: &str) {
    send_frame(
        socket,
        serde_json::json!({
            "type": "send",
            "destination": format!("/app/room/{room_id}"),
            "body": {"content": content}
        }),
    )
    .await;
}
