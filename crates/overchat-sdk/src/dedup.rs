//! 去重台账
//!
//! 每个房间一份，归属于该房间的同步循环：
//! - 已投递消息 ID 集合，保证同一消息对 UI 协作方至多投递一次
//! - 待确认回显的指纹索引，让用户自己的消息不会出现两次
//!   （一次回显、一次服务端确认）
//!
//! ID 集合有界：增量拉取从游标之后严格取新，不会重放已越过的 ID，
//! 集合只需覆盖首拉页与第一轮增量的重叠窗口、以及半途失败重放的
//! 重复投递，按插入顺序剪到最近 `max_seen` 条即可，不损正确性。

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::message::{Fingerprint, LocalEcho, Message, MessageId, RoomId};

/// `deliver` 的判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum DeliverOutcome {
    /// 已见过该 ID，丢弃
    Duplicate,
    /// 新消息，正常投递
    New,
    /// 命中待确认回显，以确认消息原位取代之
    Reconciled { previous_echo_id: MessageId },
}

pub struct DedupLedger {
    room: RoomId,
    seen: HashSet<MessageId>,
    seen_order: VecDeque<MessageId>,
    max_seen: usize,
    /// 指纹 -> 待确认回显 ID；从不主动淘汰（未确认的回显无限期保留）
    pending_echoes: HashMap<Fingerprint, MessageId>,
    tolerance_ms: i64,
}

impl DedupLedger {
    pub fn new(room: RoomId, max_seen: usize, tolerance_ms: i64) -> Self {
        Self {
            room,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            max_seen: max_seen.max(1),
            pending_echoes: HashMap::new(),
            tolerance_ms,
        }
    }

    /// 登记一条待确认回显
    pub fn register_echo(&mut self, echo: &LocalEcho) {
        self.pending_echoes
            .insert(echo.fingerprint.clone(), echo.id.clone());
    }

    /// 判定一条服务端确认消息的去向
    ///
    /// ID 判重在先；未见过的消息再探指纹（本桶与相邻桶），命中则
    /// 移除回显并报告对账，否则作为新消息投递。无论走哪条路，
    /// ID 都会被记为已见。
    pub fn deliver(&mut self, message: &Message) -> DeliverOutcome {
        if self.seen.contains(&message.id) {
            debug!(room = %self.room, id = %message.id, "duplicate id");
            return DeliverOutcome::Duplicate;
        }
        self.mark_seen(message.id.clone());

        for fingerprint in message.fingerprint_candidates(&self.room, self.tolerance_ms) {
            if let Some(previous_echo_id) = self.pending_echoes.remove(&fingerprint) {
                return DeliverOutcome::Reconciled { previous_echo_id };
            }
        }
        DeliverOutcome::New
    }

    /// 待确认回显数量
    pub fn pending_echo_count(&self) -> usize {
        self.pending_echoes.len()
    }

    /// 已见 ID 数量
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn mark_seen(&mut self, id: MessageId) {
        if self.seen.insert(id.clone()) {
            self.seen_order.push_back(id);
        }
        while self.seen_order.len() > self.max_seen {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}
