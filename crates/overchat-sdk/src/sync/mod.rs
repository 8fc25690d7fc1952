//! 房间同步模块
//!
//! 功能包括：
//! - 每房间一个独立同步循环（并发单元，互不共享可变状态）
//! - 游标跟踪与严格增量拉取
//! - 有界退避与房间健康状态机

pub mod room_loop;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::{MessageId, RoomId};

pub use room_loop::{LoopCommand, RoomSyncLoop};

/// 房间同步状态指示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    /// 正常同步
    Healthy,
    /// 连续失败中，退避重试
    Degraded,
    /// 已关闭（终态）
    Stopped,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Healthy => write!(f, "healthy"),
            RoomStatus::Degraded => write!(f, "degraded"),
            RoomStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// 同步参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 首次拉取条数
    pub initial_page_size: usize,
    /// 全局房间轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 私聊房间轮询间隔（毫秒）
    pub peer_poll_interval_ms: u64,
    /// 退避基础延迟（毫秒）
    pub backoff_base_ms: u64,
    /// 退避步数上限
    pub backoff_cap_steps: u32,
    /// 退避随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 指纹时间桶宽度（毫秒）
    pub fingerprint_tolerance_ms: i64,
    /// 每房间去重集合上限（远大于首拉页大小即可）
    pub max_seen_ids: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_page_size: 40,
            poll_interval_ms: 2000,
            peer_poll_interval_ms: 2500,
            backoff_base_ms: 1000,
            backoff_cap_steps: 8,
            jitter_factor: 0.1,
            fingerprint_tolerance_ms: 5000,
            max_seen_ids: 4096,
        }
    }
}

impl SyncConfig {
    /// 该房间的稳态轮询间隔
    pub fn poll_interval(&self, room: &RoomId) -> Duration {
        if room.is_global() {
            Duration::from_millis(self.poll_interval_ms)
        } else {
            Duration::from_millis(self.peer_poll_interval_ms)
        }
    }

    /// 退避延迟：`min(连续失败数, 步数上限) * 基础延迟`，外加随机抖动
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        let steps = consecutive_failures.min(self.backoff_cap_steps) as u64;
        let base = (steps * self.backoff_base_ms) as f64;
        let jitter = base * self.jitter_factor * (rand::random::<f64>() - 0.5);
        Duration::from_millis((base + jitter).max(0.0) as u64)
    }
}

/// 每房间同步状态
///
/// 归属且仅归属于该房间的同步循环；房间关闭时随循环一起销毁，
/// 重新打开的房间从零开始重新同步。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSyncState {
    /// 最后投递消息的 ID；None 表示从未拉取过（走首次拉取）
    pub cursor: Option<MessageId>,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 最近一次发起拉取的时间（UTC 毫秒）
    pub last_poll_at: Option<i64>,
    /// 当前状态
    pub status: RoomStatus,
}

impl RoomSyncState {
    pub fn new() -> Self {
        Self {
            cursor: None,
            consecutive_failures: 0,
            last_poll_at: None,
            status: RoomStatus::Healthy,
        }
    }

    /// 推进游标（只进不退）
    pub fn advance_cursor(&mut self, id: MessageId) {
        match &self.cursor {
            Some(current) if *current >= id => {}
            _ => self.cursor = Some(id),
        }
    }

    /// 一次成功：清零失败计数，回到健康态
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.status = RoomStatus::Healthy;
    }

    /// 一次失败：累加计数，降级
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.status = RoomStatus::Degraded;
    }
}

impl Default for RoomSyncState {
    fn default() -> Self {
        Self::new()
    }
}
