// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! `transport` 子模块负责建立连接，并把底层 WebSocket 文本消息解析为 [`crate::message::EnginePacket`]。
//! 重连、心跳超时等会话策略由上层的遥测通道负责。

pub mod transport;
