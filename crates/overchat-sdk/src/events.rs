//! 事件系统模块 - 同步引擎对 UI 协作方的唯一出口
//!
//! 功能包括：
//! - 消息到达 / 回显对账 / 房间状态 / 整体连通性事件
//! - 基于 broadcast 的事件广播与订阅
//! - 事件统计
//!
//! 同步循环与 UI 协作方之间只通过这条消息通道通信，
//! 不提供共享内存回调。

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::message::{Message, MessageId, RoomId};
use crate::sync::RoomStatus;
use crate::utils::time::now_millis;

/// 交给 UI 协作方的事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UiEvent {
    /// 新消息进入房间
    ///
    /// `pending = true` 表示这是本地回显，尚未得到服务端确认。
    MessageArrived {
        room: RoomId,
        message: Message,
        pending: bool,
    },
    /// 本地回显被服务端确认的消息取代
    ///
    /// UI 应原位更新 `previous_echo_id` 对应的气泡，而不是新增一条。
    EchoReconciled {
        room: RoomId,
        previous_echo_id: MessageId,
        message: Message,
    },
    /// 单个房间同步状态变更
    RoomStatusChanged { room: RoomId, status: RoomStatus },
    /// 整体连通性变更
    ConnectivityChanged { status: RoomStatus },
}

impl UiEvent {
    /// 事件类型字符串（统计用）
    pub fn event_type(&self) -> &'static str {
        match self {
            UiEvent::MessageArrived { .. } => "message_arrived",
            UiEvent::EchoReconciled { .. } => "echo_reconciled",
            UiEvent::RoomStatusChanged { .. } => "room_status_changed",
            UiEvent::ConnectivityChanged { .. } => "connectivity_changed",
        }
    }

    /// 事件关联的房间（整体连通性事件没有）
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            UiEvent::MessageArrived { room, .. } => Some(room),
            UiEvent::EchoReconciled { room, .. } => Some(room),
            UiEvent::RoomStatusChanged { room, .. } => Some(room),
            UiEvent::ConnectivityChanged { .. } => None,
        }
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 最后事件时间（UTC 毫秒）
    pub last_event_at: Option<i64>,
}

/// 事件管理器
///
/// 发布端挂在各同步循环与出站派发器上；UI 协作方通过 `subscribe`
/// 拿到接收端。无订阅者时发布静默丢弃（压测/无 UI 场景属正常）。
pub struct EventManager {
    sender: broadcast::Sender<UiEvent>,
    stats: RwLock<EventStats>,
}

impl EventManager {
    /// 创建事件管理器，`capacity` 为广播缓冲区大小
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            stats: RwLock::new(EventStats::default()),
        }
    }

    /// 发布事件
    pub fn emit(&self, event: UiEvent) {
        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_at = Some(now_millis());
        }

        if let Err(e) = self.sender.send(event) {
            debug!("no active receivers, event dropped: {}", e);
        }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.sender.subscribe()
    }

    /// 活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// 获取事件统计
    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageId;

    fn sample_message(id: &str) -> Message {
        Message {
            id: MessageId::from(id),
            author: "player1".to_string(),
            payload: "hello".to_string(),
            sent_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let manager = EventManager::new(16);
        let mut receiver = manager.subscribe();

        manager.emit(UiEvent::MessageArrived {
            room: RoomId::Global,
            message: sample_message("srv_1"),
            pending: false,
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "message_arrived");
        assert_eq!(event.room(), Some(&RoomId::Global));
    }

    #[tokio::test]
    async fn test_emit_without_receivers_does_not_panic() {
        let manager = EventManager::new(16);
        manager.emit(UiEvent::ConnectivityChanged {
            status: RoomStatus::Degraded,
        });
        assert_eq!(manager.stats().total_events, 1);
    }

    #[tokio::test]
    async fn test_stats_by_type() {
        let manager = EventManager::new(16);
        let _receiver = manager.subscribe();

        for _ in 0..3 {
            manager.emit(UiEvent::RoomStatusChanged {
                room: RoomId::peer("friend"),
                status: RoomStatus::Degraded,
            });
        }
        manager.emit(UiEvent::ConnectivityChanged {
            status: RoomStatus::Degraded,
        });

        let stats = manager.stats();
        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.events_by_type.get("room_status_changed"), Some(&3));
        assert_eq!(stats.events_by_type.get("connectivity_changed"), Some(&1));
        assert!(stats.last_event_at.is_some());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let manager = EventManager::new(16);
        let mut first = manager.subscribe();
        let mut second = manager.subscribe();
        assert_eq!(manager.subscriber_count(), 2);

        manager.emit(UiEvent::MessageArrived {
            room: RoomId::Global,
            message: sample_message("srv_2"),
            pending: true,
        });

        assert_eq!(first.recv().await.unwrap().event_type(), "message_arrived");
        assert_eq!(second.recv().await.unwrap().event_type(), "message_arrived");
    }
}
