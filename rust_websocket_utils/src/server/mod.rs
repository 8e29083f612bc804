// rust_websocket_utils/src/server/mod.rs

//! WebSocket 服务端模块。
//!
//! 提供监听、握手和按包收发的最小服务端实现，用于在本地模拟车队遥测服务。

pub mod transport;
