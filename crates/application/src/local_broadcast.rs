// 单进程广播器实现
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use domain::RoomId;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};

use crate::{broadcaster::BroadcastError, MessageBroadcast, MessageBroadcaster};

/// 每个聊天室一个广播通道，慢连接只会在它落后的聊天室内丢消息。
#[derive(Clone)]
pub struct LocalMessageBroadcaster {
    rooms: Arc<DashMap<RoomId, broadcast::Sender<MessageBroadcast>>>,
    capacity: usize,
}

impl LocalMessageBroadcaster {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// 为一个连接创建消息流，初始不关注任何聊天室。
    pub fn subscribe(&self) -> MessageStream {
        MessageStream::new(self.clone())
    }

    /// 当前存在广播通道的聊天室数量
    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    fn room_receiver(&self, room_id: RoomId) -> broadcast::Receiver<MessageBroadcast> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for LocalMessageBroadcaster {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl MessageBroadcaster for LocalMessageBroadcaster {
    async fn broadcast(&self, payload: MessageBroadcast) -> Result<usize, BroadcastError> {
        let room_id = payload.room_id;
        let Some(sender) = self.rooms.get(&room_id).map(|entry| entry.value().clone()) else {
            tracing::debug!(room_id = %room_id, "no active receivers for broadcast");
            return Ok(0);
        };

        match sender.send(payload) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                // 没有任何连接关注该聊天室，消息已持久化，回收通道后丢弃
                self.rooms
                    .remove_if(&room_id, |_, sender| sender.receiver_count() == 0);
                tracing::debug!(room_id = %room_id, "no active receivers for broadcast");
                Ok(0)
            }
        }
    }
}

/// 单个连接的消息流，汇合它关注的各个聊天室。
///
/// 每个关注的聊天室由一个转发任务把广播搬进连接自己的队列，流被丢弃时任务随之终止。
pub struct MessageStream {
    broadcaster: LocalMessageBroadcaster,
    tx: mpsc::Sender<MessageBroadcast>,
    rx: mpsc::Receiver<MessageBroadcast>,
    forwarders: HashMap<RoomId, JoinHandle<()>>,
}

impl MessageStream {
    pub fn new(broadcaster: LocalMessageBroadcaster) -> Self {
        let (tx, rx) = mpsc::channel(broadcaster.capacity);
        Self {
            broadcaster,
            tx,
            rx,
            forwarders: HashMap::new(),
        }
    }

    /// 返回后发往该聊天室的广播都会进入本流。
    pub fn follow(&mut self, room_id: RoomId) -> bool {
        if self.forwarders.contains_key(&room_id) {
            return false;
        }
        let receiver = self.broadcaster.room_receiver(room_id);
        let task = tokio::spawn(forward(room_id, receiver, self.tx.clone()));
        self.forwarders.insert(room_id, task);
        true
    }

    pub fn unfollow(&mut self, room_id: RoomId) -> bool {
        match self.forwarders.remove(&room_id) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_following(&self, room_id: RoomId) -> bool {
        self.forwarders.contains_key(&room_id)
    }

    /// 等待下一条关注聊天室的消息。
    pub async fn recv(&mut self) -> Option<MessageBroadcast> {
        self.rx.recv().await
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

async fn forward(
    room_id: RoomId,
    mut receiver: broadcast::Receiver<MessageBroadcast>,
    tx: mpsc::Sender<MessageBroadcast>,
) {
    loop {
        match receiver.recv().await {
            Ok(broadcast) => {
                if tx.send(broadcast).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    room_id = %room_id,
                    skipped,
                    "message stream lagged, dropping oldest broadcasts"
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use domain::{MemberId, MessageId};
    use tokio::time::timeout;

    use super::*;
    use crate::dto::MessageDto;

    fn broadcast_for(room: i64, id: i64) -> MessageBroadcast {
        MessageBroadcast::new(MessageDto {
            message_id: MessageId(id),
            room_id: RoomId(room),
            sender_id: MemberId(1),
            content: format!("message {id}"),
            read: false,
            sent_at: Utc::now(),
        })
    }

    async fn next(stream: &mut MessageStream) -> MessageBroadcast {
        timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("stream timeout")
            .expect("stream closed")
    }

    #[tokio::test]
    async fn stream_filters_by_followed_rooms() {
        let broadcaster = LocalMessageBroadcaster::new(16);
        let mut stream = broadcaster.subscribe();
        stream.follow(RoomId(2));

        assert_eq!(broadcaster.broadcast(broadcast_for(1, 1)).await.unwrap(), 0);
        assert_eq!(broadcaster.broadcast(broadcast_for(2, 2)).await.unwrap(), 1);

        let received = next(&mut stream).await;
        assert_eq!(received.room_id, RoomId(2));
        assert_eq!(received.message.message_id, MessageId(2));
    }

    #[tokio::test]
    async fn broadcast_without_receivers_is_not_an_error() {
        let broadcaster = LocalMessageBroadcaster::new(4);
        let delivered = broadcaster.broadcast(broadcast_for(1, 1)).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.active_rooms(), 0);
    }

    #[tokio::test]
    async fn unfollowed_room_is_not_delivered() {
        let broadcaster = LocalMessageBroadcaster::new(4);
        let mut stream = broadcaster.subscribe();
        assert!(stream.follow(RoomId(1)));
        assert!(!stream.follow(RoomId(1)));
        assert!(stream.follow(RoomId(2)));
        assert!(stream.unfollow(RoomId(1)));
        assert!(!stream.is_following(RoomId(1)));

        broadcaster.broadcast(broadcast_for(1, 1)).await.unwrap();
        broadcaster.broadcast(broadcast_for(2, 2)).await.unwrap();

        assert_eq!(next(&mut stream).await.room_id, RoomId(2));
    }

    #[tokio::test]
    async fn lagged_stream_keeps_receiving() {
        let broadcaster = LocalMessageBroadcaster::new(2);
        let mut stream = broadcaster.subscribe();
        stream.follow(RoomId(1));

        for id in 1..=5 {
            broadcaster.broadcast(broadcast_for(1, id)).await.unwrap();
        }

        let received = next(&mut stream).await;
        assert_eq!(received.message.message_id, MessageId(4));
    }

    #[tokio::test]
    async fn busy_room_does_not_push_out_quiet_room() {
        let broadcaster = LocalMessageBroadcaster::new(2);
        let mut stream = broadcaster.subscribe();
        stream.follow(RoomId(1));
        stream.follow(RoomId(2));

        broadcaster.broadcast(broadcast_for(2, 100)).await.unwrap();
        for id in 1..=5 {
            broadcaster.broadcast(broadcast_for(1, id)).await.unwrap();
        }

        // 繁忙聊天室只保留最新两条，安静聊天室的一条不受影响
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(next(&mut stream).await.message.message_id);
        }
        received.sort();
        assert_eq!(received, vec![MessageId(4), MessageId(5), MessageId(100)]);
    }
}
