//! `rust_websocket_utils` 提供遥测通道所需的 WebSocket 传输层工具。
//!
//! 遥测服务使用 Engine.IO v4 / Socket.IO v5 协议，本 crate 只实现其中的 WebSocket
//! 文本包部分 (不支持长轮询与二进制附件)。
//!
//! 主要模块包括：
//! - `message`: Engine.IO / Socket.IO 文本包的解析与编码，如 `EnginePacket`、`EventFrame`。
//! - `error`: 库中统一使用的错误类型 `WsError`。
//! - `client`: 客户端传输层，建立连接并按包收发。
//! - `server`: 服务端传输层，用于在本地运行一个模拟车队服务端 (主要供测试使用)。

pub mod client;
pub mod error;
pub mod message;
pub mod server;
