// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 工具库相关的错误类型。

use thiserror::Error;

/// WebSocket 工具库的统一错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 收到的文本无法解析为 Engine.IO / Socket.IO 包。
    #[error("数据包解析错误: {0}")]
    PacketParse(String),

    /// WebSocket 协议相关的错误，例如握手失败、连接被重置等。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 底层 I/O 错误。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 对端已关闭连接。
    #[error("连接已关闭")]
    ConnectionClosed,

    /// 无效的 URL 格式。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 通用消息错误，用于其他未明确分类的错误。
    #[error("消息错误: {0}")]
    Message(String),
}

impl WsError {
    /// 该错误是否意味着连接已不可用。
    ///
    /// 单个包的解析失败或不支持的消息类型不影响连接本身，调用方可以丢弃该包后继续接收。
    pub fn is_connection_lost(&self) -> bool {
        !matches!(self, WsError::PacketParse(_) | WsError::Message(_) | WsError::SerializationError(_))
    }
}
