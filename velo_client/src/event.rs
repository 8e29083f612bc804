// velo_client/src/event.rs

//! 遥测通道向订阅者发出的生命周期事件。

use std::fmt;
use std::time::Duration;
use velo_models::{DecodeError, TelemetryKind};

/// 通道进入终止状态 `Disconnected` 的原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 调用方显式调用了 `close()`。
    Closed,
    /// 连接丢失，且配置关闭了自动重连。
    ReconnectionDisabled,
    /// 连续失败次数达到上限。
    AttemptsExhausted { attempts: u32 },
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "通道已被显式关闭"),
            DisconnectReason::ReconnectionDisabled => write!(f, "连接丢失且未启用自动重连"),
            DisconnectReason::AttemptsExhausted { attempts } => write!(f, "连续 {} 次连接失败，放弃重连", attempts),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// 传输已建立，命名空间连接已被服务端确认。
    Connected,
    /// 连接丢失，将在 `delay` 后进行自上次连接成功以来的第 `attempt` 次重连。
    Reconnecting { attempt: u32, delay: Duration },
    /// 通道已终止，不会再重连。
    Disconnected { reason: DisconnectReason },
    /// 某个遥测帧解码失败并被丢弃，通道继续运行。
    DecodeFailed { kind: TelemetryKind, error: DecodeError },
}
