//! 主应用程序入口
//!
//! 加载配置，选择存储后端，启动 Axum Web API 和 WebSocket 网关。

use std::sync::Arc;

use anyhow::Context;
use application::{
    services::{ChatService, ChatServiceDependencies},
    ChatRoomRepository, LocalMessageBroadcaster, LogPushNotifier, MemberRepository,
    MemoryStorage, MessageRepository, OfflinePushGate, ParticipantRepository, SessionTracker,
    SystemClock,
};
use config::{AppConfig, StorageMode};
use infrastructure::{create_pg_pool, PgStorage, MIGRATOR};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

struct Repositories {
    member: Arc<dyn MemberRepository>,
    room: Arc<dyn ChatRoomRepository>,
    message: Arc<dyn MessageRepository>,
    participant: Arc<dyn ParticipantRepository>,
}

async fn build_repositories(config: &AppConfig, jwt: &JwtService) -> anyhow::Result<Repositories> {
    match config.storage.mode {
        StorageMode::Postgres => {
            tracing::info!(
                database = config.database.url.rsplit('@').next().unwrap_or("unknown"),
                "连接数据库"
            );
            let pool = create_pg_pool(&config.database.url, config.database.max_connections)
                .await
                .context("failed to connect database")?;
            if config.database.run_migrations {
                MIGRATOR
                    .run(&pool)
                    .await
                    .context("failed to run migrations")?;
            }

            let storage = PgStorage::new(pool);
            Ok(Repositories {
                member: storage.member_repository,
                room: storage.room_repository,
                message: storage.message_repository,
                participant: storage.participant_repository,
            })
        }
        StorageMode::Memory => {
            tracing::warn!("使用内存存储，重启后数据会丢失");
            let storage = MemoryStorage::new();
            for name in &config.storage.demo_members {
                let member = storage.insert_member(name.clone()).await;
                let token = jwt
                    .generate_token(member.id)
                    .map_err(|err| anyhow::anyhow!("{}", err.message()))?;
                tracing::info!(member_id = %member.id, name = %member.name, token = %token, "演示会员");
            }

            Ok(Repositories {
                member: Arc::new(storage.clone()),
                room: Arc::new(storage.clone()),
                message: Arc::new(storage.clone()),
                participant: Arc::new(storage),
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭服务");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let repositories = build_repositories(&config, &jwt_service).await?;

    // 在线状态只存在于本进程，重启后为空
    let sessions = Arc::new(SessionTracker::new());
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        member_repository: repositories.member,
        room_repository: repositories.room,
        message_repository: repositories.message,
        participant_repository: repositories.participant,
        sessions: sessions.clone(),
        clock: Arc::new(SystemClock::new()),
    }));
    let broadcaster = Arc::new(LocalMessageBroadcaster::new(config.broadcast.capacity));
    let push_gate = Arc::new(OfflinePushGate::new(sessions, Arc::new(LogPushNotifier)));

    let state = AppState::new(
        chat_service,
        broadcaster,
        push_gate,
        jwt_service,
        config.websocket.clone(),
    );

    // 启动 Web 服务器
    let app = router(state);
    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(
        addr = %bind_addr,
        ws_endpoint = %config.websocket.endpoint,
        "聊天服务启动"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
