use std::sync::{Mutex, PoisonError};

use chrono::{Duration, SubsecRound, Utc};
use domain::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// 系统时钟，精度截断到微秒（与 PostgreSQL 一致）。
///
/// 同一个实例返回的时间严格递增，即使系统时间回拨或两次调用落在同一微秒内，
/// 以保证同一聊天室内消息按服务端时间全序排列。
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Option<Timestamp>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}
