//! 健康聚合器
//!
//! 把各房间同步循环上报的状态归并为一个用户可见的连通性信号。
//! 状态上报每轮轮询都会发生，但事件只在发生变化时广播。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::events::{EventManager, UiEvent};
use crate::message::RoomId;
use crate::sync::RoomStatus;

/// 连通性归并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthPolicy {
    /// 只看全局房间：单个私聊抖动不应把整体指示灯拉成降级
    GlobalOnly,
    /// 所有打开的房间都健康才算健康
    AllRooms,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        HealthPolicy::GlobalOnly
    }
}

pub struct HealthAggregator {
    policy: HealthPolicy,
    rooms: RwLock<HashMap<RoomId, RoomStatus>>,
    overall: RwLock<RoomStatus>,
    events: Arc<EventManager>,
}

impl HealthAggregator {
    pub fn new(policy: HealthPolicy, events: Arc<EventManager>) -> Self {
        Self {
            policy,
            rooms: RwLock::new(HashMap::new()),
            overall: RwLock::new(RoomStatus::Healthy),
            events,
        }
    }

    /// 房间状态上报；变更才广播 `RoomStatusChanged`
    pub fn update(&self, room: &RoomId, status: RoomStatus) {
        let changed = {
            let mut rooms = self.rooms.write();
            rooms.insert(room.clone(), status) != Some(status)
        };
        if changed {
            self.events.emit(UiEvent::RoomStatusChanged {
                room: room.clone(),
                status,
            });
        }
        self.recompute();
    }

    /// 房间关闭后移除其状态（静默，不发房间事件）
    pub fn remove(&self, room: &RoomId) {
        self.rooms.write().remove(room);
        self.recompute();
    }

    /// 当前整体连通性
    pub fn overall(&self) -> RoomStatus {
        *self.overall.read()
    }

    /// 某个房间的当前状态
    pub fn room_status(&self, room: &RoomId) -> Option<RoomStatus> {
        self.rooms.read().get(room).copied()
    }

    fn recompute(&self) {
        let next = {
            let rooms = self.rooms.read();
            match self.policy {
                HealthPolicy::GlobalOnly => match rooms.get(&RoomId::Global) {
                    Some(RoomStatus::Healthy) => RoomStatus::Healthy,
                    _ => RoomStatus::Degraded,
                },
                // 已停止的房间正在关闭，不参与归并
                HealthPolicy::AllRooms => {
                    if rooms
                        .values()
                        .all(|status| *status != RoomStatus::Degraded)
                    {
                        RoomStatus::Healthy
                    } else {
                        RoomStatus::Degraded
                    }
                }
            }
        };

        let changed = {
            let mut overall = self.overall.write();
            if *overall != next {
                *overall = next;
                true
            } else {
                false
            }
        };
        if changed {
            info!(status = %next, "整体连通性变更");
            self.events.emit(UiEvent::ConnectivityChanged { status: next });
        }
    }
}
