//! SDK 门面
//!
//! `OverchatSDK` 把各组件装配起来：事件管理器、健康聚合器、房间
//! 调度器与出站派发器。初始化即打开全局房间；私聊房间按需打开。
//! UI 协作方只拿两样东西：事件订阅端和这里的几个操作入口。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::dispatch::OutboundDispatcher;
use crate::error::{OverchatSDKError, Result};
use crate::events::{EventManager, EventStats, UiEvent};
use crate::health::{HealthAggregator, HealthPolicy};
use crate::message::{LocalEcho, RoomId};
use crate::remote::RemoteLog;
use crate::scheduler::RoomScheduler;
use crate::sync::{RoomStatus, SyncConfig};

/// Overchat SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverchatConfig {
    /// 当前用户名（写入出站消息的 author）
    pub author: String,
    /// 同步参数
    pub sync: SyncConfig,
    /// 载荷长度上限（字符）
    pub max_payload_len: usize,
    /// 连通性归并策略
    pub health_policy: HealthPolicy,
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,
}

impl Default for OverchatConfig {
    fn default() -> Self {
        Self {
            author: String::new(),
            sync: SyncConfig::default(),
            max_payload_len: 500,
            health_policy: HealthPolicy::default(),
            event_buffer_size: 1024,
        }
    }
}

impl OverchatConfig {
    pub fn builder() -> OverchatConfigBuilder {
        OverchatConfigBuilder::new()
    }
}

/// Overchat SDK 配置构建器
pub struct OverchatConfigBuilder {
    config: OverchatConfig,
}

impl OverchatConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: OverchatConfig::default(),
        }
    }

    pub fn author<S: Into<String>>(mut self, author: S) -> Self {
        self.config.author = author.into();
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn max_payload_len(mut self, len: usize) -> Self {
        self.config.max_payload_len = len;
        self
    }

    pub fn health_policy(mut self, policy: HealthPolicy) -> Self {
        self.config.health_policy = policy;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn build(self) -> OverchatConfig {
        self.config
    }
}

impl Default for OverchatConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Overchat SDK
pub struct OverchatSDK {
    config: OverchatConfig,
    events: Arc<EventManager>,
    health: Arc<HealthAggregator>,
    scheduler: Arc<RoomScheduler>,
    dispatcher: OutboundDispatcher,
}

impl std::fmt::Debug for OverchatSDK {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverchatSDK")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OverchatSDK {
    /// 初始化 SDK 并打开全局房间
    pub async fn initialize(
        config: OverchatConfig,
        remote: Arc<dyn RemoteLog>,
    ) -> Result<Arc<Self>> {
        if config.author.trim().is_empty() {
            return Err(OverchatSDKError::InvalidInput(
                "author must not be empty".to_string(),
            ));
        }

        let events = Arc::new(EventManager::new(config.event_buffer_size));
        let health = Arc::new(HealthAggregator::new(config.health_policy, events.clone()));
        let scheduler = Arc::new(RoomScheduler::new(
            config.sync.clone(),
            remote.clone(),
            events.clone(),
            health.clone(),
        ));
        scheduler.start().await?;

        let dispatcher = OutboundDispatcher::new(
            config.author.clone(),
            config.max_payload_len,
            config.sync.fingerprint_tolerance_ms,
            remote,
            events.clone(),
            scheduler.clone(),
        );

        info!(author = %config.author, "SDK 初始化完成");
        Ok(Arc::new(Self {
            config,
            events,
            health,
            scheduler,
            dispatcher,
        }))
    }

    /// 订阅 UI 事件流
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// 打开房间（幂等）；返回 true 表示新打开，false 表示只需聚焦
    pub async fn open_room(&self, room: RoomId) -> Result<bool> {
        self.scheduler.open_room(room).await
    }

    /// 关闭私聊房间
    pub async fn close_room(&self, room: &RoomId) -> Result<()> {
        self.scheduler.close_room(room).await
    }

    /// 发送消息，立即返回本地回显
    pub async fn send(&self, room: &RoomId, payload: &str) -> Result<LocalEcho> {
        self.dispatcher.send(room, payload).await
    }

    /// 当前整体连通性
    pub fn connectivity(&self) -> RoomStatus {
        self.health.overall()
    }

    /// 某房间当前状态
    pub fn room_status(&self, room: &RoomId) -> Option<RoomStatus> {
        self.health.room_status(room)
    }

    /// 当前打开的房间列表
    pub async fn open_rooms(&self) -> Vec<RoomId> {
        self.scheduler.open_rooms().await
    }

    /// 事件统计
    pub fn event_stats(&self) -> EventStats {
        self.events.stats()
    }

    /// 当前配置
    pub fn config(&self) -> &OverchatConfig {
        &self.config
    }

    /// 关闭 SDK：取消并等待所有房间同步循环
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.shutdown().await
    }
}
