//! 时间处理工具模块
//!
//! 全 SDK 统一使用 UTC 毫秒时间戳（`Utc::now().timestamp_millis()`）。
//! 时间戳只用于展示与回显指纹的粗粒度时间桶，不参与消息排序 ——
//! 排序完全由服务端分配的消息 ID 决定。

use chrono::Utc;

/// 当前 UTC 毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 指纹时间桶：把毫秒时间戳折算到宽度为 `tolerance_ms` 的桶序号
///
/// 使用向下取整除法，负时间戳也落入稳定的桶。
pub fn bucket_of(timestamp_ms: i64, tolerance_ms: i64) -> i64 {
    debug_assert!(tolerance_ms > 0);
    timestamp_ms.div_euclid(tolerance_ms)
}
