//! 房间同步循环
//!
//! 每个打开的房间一个循环，是本引擎的并发单元。状态机：
//!
//! - **首次拉取**（游标为空）：取最近一页，全部投递后把游标推到
//!   页内最新 ID，进入稳态轮询；房间为空则游标保持为空，下一轮
//!   仍走首次拉取逻辑。
//! - **稳态轮询**：固定间隔休眠后拉取严格晚于游标的消息。
//! - **退避**：失败后等 `min(连续失败数, 上限) * 基础延迟`，
//!   然后重放同一个未推进游标的请求 —— 至少一次投递，不丢不漏。
//! - **停止**（终态）：取消令牌触发，撤销在途请求并释放资源。
//!
//! 去重台账与同步状态都归本循环独占，循环之间不共享可变状态；
//! 出站派发器只通过指令通道把待确认回显交进来。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::{DedupLedger, DeliverOutcome};
use crate::error::{OverchatSDKError, Result};
use crate::events::{EventManager, UiEvent};
use crate::health::HealthAggregator;
use crate::message::{LocalEcho, Message, RoomId};
use crate::remote::RemoteLog;
use crate::sync::{RoomStatus, RoomSyncState, SyncConfig};
use crate::utils::time::now_millis;

/// 调度器/派发器注入同步循环的指令
#[derive(Debug)]
pub enum LoopCommand {
    /// 登记一条待确认的本地回显
    RegisterEcho(LocalEcho),
}

/// 休眠期间的唤醒原因
enum Wake {
    Cancelled,
    Tick,
    Command(Option<LoopCommand>),
}

pub struct RoomSyncLoop {
    room: RoomId,
    config: SyncConfig,
    remote: Arc<dyn RemoteLog>,
    events: Arc<EventManager>,
    health: Arc<HealthAggregator>,
    state: RoomSyncState,
    ledger: DedupLedger,
    commands: mpsc::UnboundedReceiver<LoopCommand>,
    commands_open: bool,
    cancel: CancellationToken,
}

impl RoomSyncLoop {
    pub fn new(
        room: RoomId,
        config: SyncConfig,
        remote: Arc<dyn RemoteLog>,
        events: Arc<EventManager>,
        health: Arc<HealthAggregator>,
        commands: mpsc::UnboundedReceiver<LoopCommand>,
        cancel: CancellationToken,
    ) -> Self {
        let ledger = DedupLedger::new(
            room.clone(),
            config.max_seen_ids,
            config.fingerprint_tolerance_ms,
        );
        Self {
            room,
            config,
            remote,
            events,
            health,
            state: RoomSyncState::new(),
            ledger,
            commands,
            commands_open: true,
            cancel,
        }
    }

    /// 运行至房间关闭
    pub async fn run(mut self) {
        info!(room = %self.room, "同步循环启动");
        self.health.update(&self.room, RoomStatus::Healthy);
        let cancel = self.cancel.clone();

        loop {
            self.drain_commands();

            let poll = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.poll_once() => Some(result),
            };
            let Some(poll) = poll else { break };

            // 拉取在途期间登记的回显先入账再投递，不错过对账窗口
            self.drain_commands();

            let delay = match poll {
                Ok(batch) => {
                    self.deliver_batch(batch);
                    self.state.record_success();
                    self.health.update(&self.room, RoomStatus::Healthy);
                    self.config.poll_interval(&self.room)
                }
                Err(OverchatSDKError::Cancelled) => break,
                Err(e) => {
                    self.state.record_failure();
                    self.health.update(&self.room, RoomStatus::Degraded);
                    let delay = self.config.backoff_delay(self.state.consecutive_failures);
                    warn!(
                        room = %self.room,
                        failures = self.state.consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "拉取失败，退避后重放同一请求"
                    );
                    delay
                }
            };

            if !self.idle(delay).await {
                break;
            }
        }

        self.finish();
    }

    /// 发起一轮拉取并把原始记录校验解析成消息
    ///
    /// 游标为空走首次拉取，否则走增量拉取；任何一条记录解析失败都让
    /// 整轮失败（游标不动，计入退避），绝不半页推进。
    async fn poll_once(&mut self) -> Result<Vec<Message>> {
        self.state.last_poll_at = Some(now_millis());
        let records = match self.state.cursor.clone() {
            None => {
                debug!(room = %self.room, limit = self.config.initial_page_size, "首次拉取");
                self.remote
                    .fetch_recent(&self.room, self.config.initial_page_size)
                    .await?
            }
            Some(cursor) => {
                debug!(room = %self.room, cursor = %cursor, "增量拉取");
                self.remote.fetch_after(&self.room, &cursor).await?
            }
        };
        records.into_iter().map(Message::from_record).collect()
    }

    /// 按最旧到最新的顺序把一批消息送过去重台账
    fn deliver_batch(&mut self, batch: Vec<Message>) {
        for message in batch {
            match self.ledger.deliver(&message) {
                DeliverOutcome::Duplicate => {
                    debug!(room = %self.room, id = %message.id, "重复消息，丢弃");
                }
                DeliverOutcome::New => {
                    self.events.emit(UiEvent::MessageArrived {
                        room: self.room.clone(),
                        message: message.clone(),
                        pending: false,
                    });
                }
                DeliverOutcome::Reconciled { previous_echo_id } => {
                    info!(
                        room = %self.room,
                        echo_id = %previous_echo_id,
                        id = %message.id,
                        "本地回显已确认"
                    );
                    self.events.emit(UiEvent::EchoReconciled {
                        room: self.room.clone(),
                        previous_echo_id,
                        message: message.clone(),
                    });
                }
            }
            self.state.advance_cursor(message.id);
        }
    }

    /// 协作式等待下一轮；期间响应取消与指令
    ///
    /// 返回 false 表示循环应当停止。
    async fn idle(&mut self, delay: Duration) -> bool {
        let cancel = self.cancel.clone();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                command = self.commands.recv(), if self.commands_open => Wake::Command(command),
                _ = &mut sleep => Wake::Tick,
            };
            match wake {
                Wake::Cancelled => return false,
                Wake::Tick => return true,
                Wake::Command(Some(command)) => self.handle_command(command),
                Wake::Command(None) => self.commands_open = false,
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::RegisterEcho(echo) => {
                debug!(room = %self.room, echo_id = %echo.id, "登记本地回显");
                self.ledger.register_echo(&echo);
            }
        }
    }

    fn finish(&mut self) {
        self.state.status = RoomStatus::Stopped;
        self.health.update(&self.room, RoomStatus::Stopped);
        info!(room = %self.room, "同步循环停止");
    }
}
