//! Overchat SDK - 多房间聊天悬浮层的实时消息同步引擎
//!
//! 远端存储只提供拉取与追加（没有推送），本 SDK 用廉价轮询把每个
//! 房间的本地视图与远端只追加日志保持一致，包括：
//! - 🔄 每房间独立同步循环：首次拉取 + 游标增量轮询
//! - 🧾 去重台账：同一消息至多投递一次，本地回显与服务端确认对账
//! - 📡 网络抖动容忍：有界退避，失败重放同一请求，不丢不漏
//! - 🗂 房间调度：全局房间常驻，私聊房间按需打开/关闭
//! - 💡 健康聚合：各房间状态归并为一个连通性信号
//! - ⚙️ 事件系统：同步结果经 broadcast 通道交给 UI 协作方
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use overchat_sdk::{
//!     MessageId, OutboundMessage, OverchatConfig, OverchatSDK, RemoteLog, RemoteRecord,
//!     Result, RoomId,
//! };
//!
//! struct HttpLog;
//!
//! #[async_trait]
//! impl RemoteLog for HttpLog {
//!     async fn fetch_recent(&self, _room: &RoomId, _limit: usize) -> Result<Vec<RemoteRecord>> {
//!         Ok(Vec::new())
//!     }
//!     async fn fetch_after(&self, _room: &RoomId, _since: &MessageId) -> Result<Vec<RemoteRecord>> {
//!         Ok(Vec::new())
//!     }
//!     async fn append(&self, _room: &RoomId, _message: OutboundMessage) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = OverchatConfig::builder().author("player1").build();
//!     let sdk = OverchatSDK::initialize(config, Arc::new(HttpLog)).await?;
//!
//!     let mut events = sdk.subscribe();
//!
//!     // 打开一个私聊房间并发消息
//!     sdk.open_room(RoomId::peer("friend42")).await?;
//!     sdk.send(&RoomId::Global, "大家好!").await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod health;
pub mod message;
pub mod remote;
pub mod scheduler;
pub mod sdk;
pub mod sync;
pub mod utils;

// 重新导出核心类型，方便使用
pub use dedup::{DedupLedger, DeliverOutcome};
pub use dispatch::OutboundDispatcher;
pub use error::{OverchatSDKError, Result};
pub use events::{EventManager, EventStats, UiEvent};
pub use health::{HealthAggregator, HealthPolicy};
pub use message::{
    Fingerprint, LocalEcho, Message, MessageId, OutboundMessage, RoomId, LOCAL_ECHO_PREFIX,
};
pub use remote::{RemoteLog, RemoteRecord};
pub use scheduler::RoomScheduler;
pub use sdk::{OverchatConfig, OverchatConfigBuilder, OverchatSDK};
pub use sync::{RoomStatus, RoomSyncState, SyncConfig};
