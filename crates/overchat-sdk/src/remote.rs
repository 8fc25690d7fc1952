//! 远端日志客户端接口
//!
//! 远端存储只提供拉取与追加，没有服务端推送，因此同步只能靠轮询。
//! 本 SDK 不实现该接口，只消费它；宿主应用注入具体实现
//! （HTTP、实时数据库 REST、内存桩等皆可）。

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::message::{MessageId, OutboundMessage, RoomId};

/// 远端日志中的一条原始记录
///
/// `id` 为服务端分配的排序键；`payload` 的校验解析发生在本 SDK 内
/// （见 `Message::from_record`），客户端实现不需要理解其结构。
#[derive(Debug, Clone)]
pub struct RemoteRecord {
    pub id: String,
    pub payload: Value,
}

/// 远端日志客户端能力接口
///
/// 所有方法都是尽力而为：错误必须可捕获且对调用方非致命。
#[async_trait]
pub trait RemoteLog: Send + Sync {
    /// 拉取房间最近 `limit` 条记录，最旧在前最新在后，可能不足 `limit`
    async fn fetch_recent(&self, room: &RoomId, limit: usize) -> Result<Vec<RemoteRecord>>;

    /// 拉取严格晚于 `since` 的记录，最新在后；空列表是合法的成功
    async fn fetch_after(&self, room: &RoomId, since: &MessageId) -> Result<Vec<RemoteRecord>>;

    /// 追加一条消息到房间日志
    async fn append(&self, room: &RoomId, message: OutboundMessage) -> Result<()>;
}
