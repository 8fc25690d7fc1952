//! 消息数据模型
//!
//! 功能包括：
//! - 房间标识与服务端消息 ID
//! - 服务端确认消息 Message 及其从远端原始记录的校验解析
//! - 本地回显 LocalEcho 与回显指纹 Fingerprint
//! - 追加到远端日志的出站消息 OutboundMessage

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{OverchatSDKError, Result};
use crate::remote::RemoteRecord;
use crate::utils::time::{bucket_of, now_millis};

/// 本地回显 ID 前缀
///
/// 固定且不可猜测的前缀保证合成 ID 空间与服务端 ID 空间永不相交。
pub const LOCAL_ECHO_PREFIX: &str = "local_";

/// 房间标识
///
/// 一个共享广播房间加任意数量按需打开的点对点私聊房间。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomId {
    /// 全局广播房间（启动即打开，永不关闭）
    Global,
    /// 点对点私聊房间，以对端用户名标识
    Peer(String),
}

impl RoomId {
    /// 构造一个私聊房间标识
    pub fn peer<S: Into<String>>(name: S) -> Self {
        RoomId::Peer(name.into())
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RoomId::Global)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomId::Global => write!(f, "global"),
            RoomId::Peer(name) => write!(f, "dm:{}", name),
        }
    }
}

/// 服务端分配的消息 ID
///
/// 不透明字符串，同一房间内按到达顺序字典序可比，永不解析其内容。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 是否为本地回显的合成 ID
    pub fn is_local_echo(&self) -> bool {
        self.0.starts_with(LOCAL_ECHO_PREFIX)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId(value.to_string())
    }
}

/// 回显指纹
///
/// (author, payload, room, 粗粒度时间桶) 的 sha256 十六进制摘要，
/// 用于把本地回显和它稍后被服务端确认的副本对上号。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(author: &str, payload: &str, room: &RoomId, bucket: i64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(author.as_bytes());
        hasher.update(b"\n");
        hasher.update(payload.as_bytes());
        hasher.update(b"\n");
        hasher.update(room.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(bucket.to_be_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 服务端确认的消息（一经确认即不可变）
///
/// `sent_at` 为客户端填写的时间戳，仅用于展示与指纹时间桶，不参与排序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: String,
    /// 文本或媒体引用（媒体以 URL 形式内嵌，由 UI 协作方识别）
    pub payload: String,
    /// UTC 毫秒时间戳，仅展示用
    pub sent_at: i64,
}

/// 远端记录 payload 的线上结构（缺字段/错类型 => MalformedResponse）
#[derive(Debug, Deserialize)]
struct WireBody {
    author: String,
    payload: String,
    sent_at: i64,
}

impl Message {
    /// 从远端原始记录校验解析
    ///
    /// 任何缺失或类型不符的必填字段都返回 `MalformedResponse`，
    /// 由同步循环计入退避，绝不让循环崩溃。
    pub fn from_record(record: RemoteRecord) -> Result<Self> {
        if record.id.is_empty() {
            return Err(OverchatSDKError::MalformedResponse(
                "record id is empty".to_string(),
            ));
        }
        let body: WireBody = serde_json::from_value(record.payload)?;
        Ok(Self {
            id: MessageId(record.id),
            author: body.author,
            payload: body.payload,
            sent_at: body.sent_at,
        })
    }

    /// 指纹候选：本桶与相邻两桶
    ///
    /// 本地发送时间和服务端记下的时间可能有小幅偏差，匹配时向两侧各
    /// 多探一个桶来覆盖 ±tolerance 的窗口。
    pub fn fingerprint_candidates(&self, room: &RoomId, tolerance_ms: i64) -> [Fingerprint; 3] {
        let bucket = bucket_of(self.sent_at, tolerance_ms);
        [bucket - 1, bucket, bucket + 1]
            .map(|b| Fingerprint::compute(&self.author, &self.payload, room, b))
    }
}

/// 追加到远端日志的出站消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub author: String,
    pub payload: String,
    pub sent_at: i64,
}

/// 本地回显
///
/// 发送瞬间交给 UI 协作方展示的消息副本，带合成 ID 与待确认标记；
/// 服务端确认的同指纹消息到达时被取代，否则无限期保持待确认。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEcho {
    pub id: MessageId,
    pub author: String,
    pub payload: String,
    pub sent_at: i64,
    pub fingerprint: Fingerprint,
    pub pending: bool,
}

impl LocalEcho {
    /// 以当前时间构造回显
    pub fn new(room: &RoomId, author: &str, payload: &str, tolerance_ms: i64) -> Self {
        Self::new_at(room, author, payload, now_millis(), tolerance_ms)
    }

    /// 以指定时间构造回显
    pub fn new_at(
        room: &RoomId,
        author: &str,
        payload: &str,
        sent_at: i64,
        tolerance_ms: i64,
    ) -> Self {
        let id = MessageId(format!("{}{}", LOCAL_ECHO_PREFIX, Uuid::new_v4().simple()));
        let fingerprint =
            Fingerprint::compute(author, payload, room, bucket_of(sent_at, tolerance_ms));
        Self {
            id,
            author: author.to_string(),
            payload: payload.to_string(),
            sent_at,
            fingerprint,
            pending: true,
        }
    }

    /// 转成交给 UI 协作方的消息视图
    pub fn as_message(&self) -> Message {
        Message {
            id: self.id.clone(),
            author: self.author.clone(),
            payload: self.payload.clone(),
            sent_at: self.sent_at,
        }
    }

    /// 转成追加到远端日志的出站消息
    pub fn outbound(&self) -> OutboundMessage {
        OutboundMessage {
            author: self.author.clone(),
            payload: self.payload.clone(),
            sent_at: self.sent_at,
        }
    }
}
