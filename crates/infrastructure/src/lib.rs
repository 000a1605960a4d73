//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储，实现应用层定义的存储端口。

pub mod migrations;
pub mod repository;

pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgChatRoomRepository, PgMemberRepository, PgMessageRepository,
    PgParticipantRepository, PgStorage,
};
