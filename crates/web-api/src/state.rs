use std::sync::Arc;

use application::{ChatService, LocalMessageBroadcaster, OfflinePushGate};
use config::WebSocketConfig;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub broadcaster: Arc<LocalMessageBroadcaster>,
    pub push_gate: Arc<OfflinePushGate>,
    pub jwt_service: Arc<JwtService>,
    pub websocket: Arc<WebSocketConfig>,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        broadcaster: Arc<LocalMessageBroadcaster>,
        push_gate: Arc<OfflinePushGate>,
        jwt_service: Arc<JwtService>,
        websocket: WebSocketConfig,
    ) -> Self {
        Self {
            chat_service,
            broadcaster,
            push_gate,
            jwt_service,
            websocket: Arc::new(websocket),
        }
    }
}
