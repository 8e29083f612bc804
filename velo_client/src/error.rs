// velo_client/src/error.rs

//! 遥测通道的错误类型。
//!
//! 只有 `Configuration` 会返回给调用方 (在 `TelemetryChannel::connect` 时)；
//! 其余错误都在重连循环内部处理，只出现在日志和通道事件里。

use rust_websocket_utils::error::WsError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    /// 服务端地址或连接选项无效。
    #[error("通道配置错误: {0}")]
    Configuration(String),

    /// 建立连接或收发数据时的传输层错误。
    #[error("传输层错误: {0}")]
    Transport(#[from] WsError),

    /// 在规定时间内没有收到服务端的任何数据包。
    #[error("超过 {0:?} 未收到服务端数据包")]
    Timeout(Duration),

    /// 服务端拒绝或断开了 Socket.IO 会话。
    #[error("服务端断开会话: {0}")]
    Rejected(String),
}
