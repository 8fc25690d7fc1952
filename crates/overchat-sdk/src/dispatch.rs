//! 出站派发器
//!
//! `send`：校验载荷 -> 立即构造本地回显（先于任何网络 IO 交给
//! UI 协作方）-> 把回显指纹登记进房间循环 -> 异步追加到远端日志，
//! 发出后不管。追加失败只让回显无限期保持待确认；自动重发是留给
//! 上层的扩展点，本核心不做。
//!
//! 当前用户名在构造时显式传入，不读任何全局状态。回显的本地投递
//! 与其他房间的轮询结果之间没有任何顺序保证，顺序只在单个房间内
//! 成立。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{OverchatSDKError, Result};
use crate::events::{EventManager, UiEvent};
use crate::message::{LocalEcho, RoomId};
use crate::remote::RemoteLog;
use crate::scheduler::RoomScheduler;
use crate::sync::LoopCommand;

pub struct OutboundDispatcher {
    author: String,
    max_payload_len: usize,
    fingerprint_tolerance_ms: i64,
    remote: Arc<dyn RemoteLog>,
    events: Arc<EventManager>,
    scheduler: Arc<RoomScheduler>,
}

impl OutboundDispatcher {
    pub fn new(
        author: String,
        max_payload_len: usize,
        fingerprint_tolerance_ms: i64,
        remote: Arc<dyn RemoteLog>,
        events: Arc<EventManager>,
        scheduler: Arc<RoomScheduler>,
    ) -> Self {
        Self {
            author,
            max_payload_len,
            fingerprint_tolerance_ms,
            remote,
            events,
            scheduler,
        }
    }

    /// 发送一条消息，立即返回本地回显
    ///
    /// 目标房间必须已打开，否则返回 `NotFound`。回显在 append 发出
    /// 之前就已登记并交给 UI，服务端确认到达时由该房间的同步循环对账。
    pub async fn send(&self, room: &RoomId, payload: &str) -> Result<LocalEcho> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(OverchatSDKError::InvalidInput(
                "payload must not be empty".to_string(),
            ));
        }
        if payload.chars().count() > self.max_payload_len {
            return Err(OverchatSDKError::InvalidInput(format!(
                "payload exceeds {} chars",
                self.max_payload_len
            )));
        }

        let commands = self.scheduler.command_sender(room).await?;
        let echo = LocalEcho::new(room, &self.author, payload, self.fingerprint_tolerance_ms);

        // 先登记指纹，再发事件，最后才碰网络：确认消息无论多快到达，
        // 台账里都已经有这条回显
        commands
            .send(LoopCommand::RegisterEcho(echo.clone()))
            .map_err(|_| OverchatSDKError::NotFound(room.to_string()))?;

        self.events.emit(UiEvent::MessageArrived {
            room: room.clone(),
            message: echo.as_message(),
            pending: true,
        });
        debug!(room = %room, echo_id = %echo.id, "本地回显已投递");

        let remote = self.remote.clone();
        let target = room.clone();
        let outbound = echo.outbound();
        tokio::spawn(async move {
            if let Err(e) = remote.append(&target, outbound).await {
                // 扩展点：上层可监听此日志或自行重发；回显保持待确认
                warn!(room = %target, error = %e, "追加失败，回显保持待确认");
            }
        });

        Ok(echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthAggregator, HealthPolicy};
    use crate::remote::mock::MockRemoteLog;
    use crate::sync::SyncConfig;
    use tokio::sync::broadcast;

    struct Harness {
        remote: Arc<MockRemoteLog>,
        receiver: broadcast::Receiver<UiEvent>,
        scheduler: Arc<RoomScheduler>,
        dispatcher: OutboundDispatcher,
    }

    async fn harness() -> Harness {
        let remote = MockRemoteLog::new();
        let events = Arc::new(EventManager::new(256));
        let receiver = events.subscribe();
        let health = Arc::new(HealthAggregator::new(HealthPolicy::GlobalOnly, events.clone()));
        let config = SyncConfig {
            jitter_factor: 0.0,
            ..SyncConfig::default()
        };
        let scheduler = Arc::new(RoomScheduler::new(
            config.clone(),
            remote.clone(),
            events.clone(),
            health,
        ));
        scheduler.start().await.unwrap();
        let dispatcher = OutboundDispatcher::new(
            "player1".to_string(),
            500,
            config.fingerprint_tolerance_ms,
            remote.clone(),
            events,
            scheduler.clone(),
        );
        Harness {
            remote,
            receiver,
            scheduler,
            dispatcher,
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_emits_pending_echo_then_appends() {
        let mut h = harness().await;
        settle().await;
        while h.receiver.try_recv().is_ok() {}

        let echo = h.dispatcher.send(&RoomId::Global, "hello").await.unwrap();
        assert!(echo.pending);
        assert!(echo.id.is_local_echo());

        // 回显事件立即可见
        let event = h.receiver.try_recv().unwrap();
        match event {
            UiEvent::MessageArrived {
                room,
                message,
                pending,
            } => {
                assert_eq!(room, RoomId::Global);
                assert_eq!(message.id, echo.id);
                assert_eq!(message.payload, "hello");
                assert!(pending);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // 追加异步完成
        settle().await;
        let appends = h.remote.appends(&RoomId::Global);
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].author, "player1");
        assert_eq!(appends[0].payload, "hello");

        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rejects_blank_payload() {
        let h = harness().await;
        for payload in ["", "   ", "\n\t"] {
            let err = h.dispatcher.send(&RoomId::Global, payload).await.unwrap_err();
            assert!(matches!(err, OverchatSDKError::InvalidInput(_)));
        }
        assert!(h.remote.appends(&RoomId::Global).is_empty());
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rejects_oversized_payload() {
        let h = harness().await;
        let oversized = "x".repeat(501);
        let err = h
            .dispatcher
            .send(&RoomId::Global, &oversized)
            .await
            .unwrap_err();
        assert!(matches!(err, OverchatSDKError::InvalidInput(_)));

        // 恰好到上限则放行
        let max = "x".repeat(500);
        h.dispatcher.send(&RoomId::Global, &max).await.unwrap();
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_to_unopened_room_is_not_found() {
        let h = harness().await;
        let err = h
            .dispatcher
            .send(&RoomId::peer("stranger"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, OverchatSDKError::NotFound(_)));
        h.scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_append_failure_leaves_echo_pending() {
        let mut h = harness().await;
        h.remote.set_fail_appends(true);
        settle().await;
        while h.receiver.try_recv().is_ok() {}

        let echo = h.dispatcher.send(&RoomId::Global, "hello").await.unwrap();
        settle().await;

        // 回显仍按待确认投递，追加没有落盘，也没有任何崩溃或重试
        assert!(echo.pending);
        assert!(h.remote.appends(&RoomId::Global).is_empty());
        assert!(h
            .receiver
            .try_recv()
            .map(|e| matches!(e, UiEvent::MessageArrived { pending: true, .. }))
            .unwrap_or(false));

        h.scheduler.shutdown().await.unwrap();
    }
}
