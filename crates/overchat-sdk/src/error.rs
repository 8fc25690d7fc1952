use thiserror::Error;

/// SDK 统一错误类型
///
/// 本核心中没有任何错误是进程致命的：拉取类故障按退避策略重试，
/// 追加失败只让回显保持待确认，取消是关闭流程的预期结果。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OverchatSDKError {
    /// 瞬时拉取失败（网络/超时），按退避策略重试，永不上抛为致命错误
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),
    /// 瞬时追加失败（发送失败），回显保持待确认，本核心不自动重试
    #[error("Transient append error: {0}")]
    TransientAppend(String),
    /// 远端记录无法解析，视作瞬时拉取失败并计入退避
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// 已取消（关闭房间/退出时的预期结果，调用方应静默处理）
    #[error("Cancelled")]
    Cancelled,
    /// 参数非法
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// 目标不存在
    #[error("Not found: {0}")]
    NotFound(String),
    /// 运行时错误
    #[error("Runtime error: {0}")]
    Runtime(String),
    /// 正在关闭
    #[error("Shutting down: {0}")]
    ShuttingDown(String),
}

impl OverchatSDKError {
    /// 判断是否为瞬时错误（可按策略重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OverchatSDKError::TransientFetch(_)
                | OverchatSDKError::TransientAppend(_)
                | OverchatSDKError::MalformedResponse(_)
        )
    }

    /// 判断是否为取消（预期结果，不计入失败统计）
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OverchatSDKError::Cancelled)
    }
}

impl From<serde_json::Error> for OverchatSDKError {
    fn from(error: serde_json::Error) -> Self {
        OverchatSDKError::MalformedResponse(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OverchatSDKError>;
