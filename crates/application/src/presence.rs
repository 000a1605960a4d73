//! 会话跟踪器
//!
//! 记录哪些会员正在订阅哪个聊天室的实时更新，用于判断是否需要推送通知，
//! 以及对外报告在线状态。
//!
//! 状态只存在于进程内存中：进程重启后从空开始重建，不与持久化数据同步，
//! 只是尽力而为的在线信号。

use std::collections::HashSet;

use dashmap::{DashMap, DashSet};
use domain::{MemberId, RoomId};

/// 聊天室 → 在线会员集合
///
/// 所有方法都只需要 `&self`，可以在任意连接任务间共享一个 `Arc<SessionTracker>`。
#[derive(Debug, Default)]
pub struct SessionTracker {
    rooms: DashMap<RoomId, DashSet<MemberId>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 幂等添加，返回会员此前是否不在该聊天室中。
    pub fn add_session(&self, room_id: RoomId, member_id: MemberId) -> bool {
        // entry 持有分片写锁，插入与 remove_session 中的空集合回收互斥
        let added = self.rooms.entry(room_id).or_default().insert(member_id);
        if added {
            tracing::debug!(room_id = %room_id, member_id = %member_id, "会话已登记");
        }
        added
    }

    /// 移除会话；集合变空时整个聊天室条目被回收。
    pub fn remove_session(&self, room_id: RoomId, member_id: MemberId) -> bool {
        let removed = match self.rooms.get(&room_id) {
            Some(members) => members.remove(&member_id).is_some(),
            None => false,
        };
        self.rooms.remove_if(&room_id, |_, members| members.is_empty());
        if removed {
            tracing::debug!(room_id = %room_id, member_id = %member_id, "会话已移除");
        }
        removed
    }

    pub fn is_user_connected(&self, room_id: RoomId, member_id: MemberId) -> bool {
        self.rooms
            .get(&room_id)
            .is_some_and(|members| members.contains(&member_id))
    }

    /// 聊天室当前在线会员的快照；没有条目时返回空集合。
    pub fn connected_users(&self, room_id: RoomId) -> HashSet<MemberId> {
        self.rooms
            .get(&room_id)
            .map(|members| members.iter().map(|member| *member).collect())
            .unwrap_or_default()
    }

    /// 连接断开时调用一次：从所有聊天室中移除该会员，返回其离开的聊天室。
    pub fn remove_all_sessions(&self, member_id: MemberId) -> Vec<RoomId> {
        let left: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().remove(&member_id).is_some())
            .map(|entry| *entry.key())
            .collect();

        // 迭代期间持有分片读锁，回收必须放在迭代结束之后
        for room_id in &left {
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }

        if !left.is_empty() {
            tracing::debug!(member_id = %member_id, rooms = left.len(), "已清理会员的全部会话");
        }
        left
    }

    /// 当前有在线会员的聊天室数量
    pub fn tracked_rooms(&self) -> usize {
        self.rooms.len()
    }
}
