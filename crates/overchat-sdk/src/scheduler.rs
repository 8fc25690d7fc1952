//! 房间调度器
//!
//! 持有打开房间的集合并管理各房间同步循环的生命周期：
//! - 全局房间启动即打开，永不关闭
//! - 打开已打开的房间是幂等空操作（只用于聚焦）
//! - 关闭先取消在途请求、等循环退出、再移除状态，之后才向调用方
//!   报告完成 —— 不泄漏资源，也不会有循环复活
//! - 并发打开的私聊房间数量不设上限

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{OverchatSDKError, Result};
use crate::events::EventManager;
use crate::health::HealthAggregator;
use crate::message::RoomId;
use crate::remote::RemoteLog;
use crate::sync::{LoopCommand, RoomSyncLoop, SyncConfig};

/// 打开房间的句柄
struct RoomHandle {
    commands: mpsc::UnboundedSender<LoopCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct RoomScheduler {
    config: SyncConfig,
    remote: Arc<dyn RemoteLog>,
    events: Arc<EventManager>,
    health: Arc<HealthAggregator>,
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    shutdown: CancellationToken,
}

impl RoomScheduler {
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteLog>,
        events: Arc<EventManager>,
        health: Arc<HealthAggregator>,
    ) -> Self {
        Self {
            config,
            remote,
            events,
            health,
            rooms: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// 启动调度器：打开全局房间
    pub async fn start(&self) -> Result<()> {
        self.open_room(RoomId::Global).await.map(|_| ())
    }

    /// 打开房间（幂等）
    ///
    /// 返回 true 表示新打开，false 表示已打开（调用方只需聚焦）。
    pub async fn open_room(&self, room: RoomId) -> Result<bool> {
        if self.shutdown.is_cancelled() {
            return Err(OverchatSDKError::ShuttingDown(
                "scheduler is shutting down".to_string(),
            ));
        }

        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(&room) {
            debug!(room = %room, "房间已打开，仅聚焦");
            return Ok(false);
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let cancel = self.shutdown.child_token();
        let sync_loop = RoomSyncLoop::new(
            room.clone(),
            self.config.clone(),
            self.remote.clone(),
            self.events.clone(),
            self.health.clone(),
            command_rx,
            cancel.clone(),
        );
        let task = tokio::spawn(sync_loop.run());
        rooms.insert(
            room.clone(),
            RoomHandle {
                commands,
                cancel,
                task,
            },
        );
        info!(room = %room, "房间已打开");
        Ok(true)
    }

    /// 关闭房间
    ///
    /// 取消在途请求并等循环完全退出后才返回；其去重台账随之丢弃，
    /// 重新打开会从头走首次拉取。
    pub async fn close_room(&self, room: &RoomId) -> Result<()> {
        if room.is_global() {
            return Err(OverchatSDKError::InvalidInput(
                "the global room cannot be closed".to_string(),
            ));
        }

        let handle = self.rooms.lock().await.remove(room);
        let Some(handle) = handle else {
            return Err(OverchatSDKError::NotFound(room.to_string()));
        };

        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(room = %room, error = %e, "同步循环任务异常退出");
        }
        self.health.remove(room);
        info!(room = %room, "房间已关闭");
        Ok(())
    }

    /// 房间是否已打开
    pub async fn is_open(&self, room: &RoomId) -> bool {
        self.rooms.lock().await.contains_key(room)
    }

    /// 当前打开的房间列表
    pub async fn open_rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    /// 取某房间的指令发送端（出站派发器登记回显用）
    pub(crate) async fn command_sender(
        &self,
        room: &RoomId,
    ) -> Result<mpsc::UnboundedSender<LoopCommand>> {
        self.rooms
            .lock()
            .await
            .get(room)
            .map(|handle| handle.commands.clone())
            .ok_or_else(|| OverchatSDKError::NotFound(room.to_string()))
    }

    /// 应用退出：取消并等待所有同步循环
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        let handles: Vec<(RoomId, RoomHandle)> =
            self.rooms.lock().await.drain().collect();

        let joins = handles.into_iter().map(|(room, handle)| async move {
            if let Err(e) = handle.task.await {
                warn!(room = %room, error = %e, "同步循环任务异常退出");
            }
            room
        });
        for room in join_all(joins).await {
            self.health.remove(&room);
        }
        info!("调度器已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UiEvent;
    use crate::health::HealthPolicy;
    use crate::remote::mock::{record, MockRemoteLog};
    use crate::sync::RoomStatus;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct Harness {
        remote: Arc<MockRemoteLog>,
        health: Arc<HealthAggregator>,
        receiver: broadcast::Receiver<UiEvent>,
        scheduler: RoomScheduler,
    }

    fn harness() -> Harness {
        let remote = MockRemoteLog::new();
        let events = Arc::new(EventManager::new(256));
        let receiver = events.subscribe();
        let health = Arc::new(HealthAggregator::new(HealthPolicy::GlobalOnly, events.clone()));
        let config = SyncConfig {
            jitter_factor: 0.0,
            ..SyncConfig::default()
        };
        let scheduler = RoomScheduler::new(config, remote.clone(), events.clone(), health.clone());
        Harness {
            remote,
            health,
            receiver,
            scheduler,
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn count_arrived(receiver: &mut broadcast::Receiver<UiEvent>, id: &str) -> usize {
        let mut count = 0;
        while let Ok(event) = receiver.try_recv() {
            if let UiEvent::MessageArrived { message, .. } = event {
                if message.id.as_str() == id {
                    count += 1;
                }
            }
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_opens_global_room() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        settle().await;

        assert!(h.scheduler.is_open(&RoomId::Global).await);
        assert_eq!(h.remote.recent_call_count(&RoomId::Global), 1);
        assert_eq!(
            h.health.room_status(&RoomId::Global),
            Some(RoomStatus::Healthy)
        );
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_room_is_idempotent() {
        let mut h = harness();
        let room = RoomId::peer("friend42");
        h.remote
            .script_recent(&room, Ok(vec![record("a", "friend42", "hey", 1000)]));

        assert!(h.scheduler.open_room(room.clone()).await.unwrap());
        assert!(!h.scheduler.open_room(room.clone()).await.unwrap());
        settle().await;
        tokio::time::advance(Duration::from_millis(5001)).await;
        settle().await;

        // 只有一个循环：首拉只发生一次，消息只投递一次
        assert_eq!(h.remote.recent_call_count(&room), 1);
        assert_eq!(count_arrived(&mut h.receiver, "a"), 1);
        assert_eq!(h.scheduler.open_rooms().await.len(), 1);
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_room_cancels_loop() {
        let h = harness();
        let room = RoomId::peer("friend42");
        h.scheduler.open_room(room.clone()).await.unwrap();
        settle().await;
        let polls_before = h.remote.recent_call_count(&room);

        h.scheduler.close_room(&room).await.unwrap();
        assert!(!h.scheduler.is_open(&room).await);
        assert_eq!(h.health.room_status(&room), None);

        // 关闭后不再有任何拉取
        tokio::time::advance(Duration::from_millis(30_000)).await;
        settle().await;
        assert_eq!(h.remote.recent_call_count(&room), polls_before);
        assert!(h.remote.after_calls(&room).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_unknown_room_is_not_found() {
        let h = harness();
        let err = h
            .scheduler
            .close_room(&RoomId::peer("stranger"))
            .await
            .unwrap_err();
        assert!(matches!(err, OverchatSDKError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_room_cannot_be_closed() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        let err = h.scheduler.close_room(&RoomId::Global).await.unwrap_err();
        assert!(matches!(err, OverchatSDKError::InvalidInput(_)));
        assert!(h.scheduler.is_open(&RoomId::Global).await);
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopened_room_resyncs_from_scratch() {
        let h = harness();
        let room = RoomId::peer("friend42");
        h.remote
            .script_recent(&room, Ok(vec![record("a", "friend42", "hey", 1000)]));
        h.remote
            .script_recent(&room, Ok(vec![record("a", "friend42", "hey", 1000)]));

        h.scheduler.open_room(room.clone()).await.unwrap();
        settle().await;
        h.scheduler.close_room(&room).await.unwrap();

        // 重新打开：台账已丢弃，重新走首次拉取
        h.scheduler.open_room(room.clone()).await.unwrap();
        settle().await;
        assert_eq!(h.remote.recent_call_count(&room), 2);
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_all_rooms() {
        let h = harness();
        h.scheduler.start().await.unwrap();
        h.scheduler.open_room(RoomId::peer("a")).await.unwrap();
        h.scheduler.open_room(RoomId::peer("b")).await.unwrap();
        settle().await;

        h.scheduler.shutdown().await.unwrap();
        assert!(h.scheduler.open_rooms().await.is_empty());

        // 关闭后禁止再打开
        let err = h.scheduler.open_room(RoomId::peer("c")).await.unwrap_err();
        assert!(matches!(err, OverchatSDKError::ShuttingDown(_)));
    }
}
