// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层核心逻辑。
//!
//! 负责建立与服务端的连接，并以 [`EnginePacket`] 为单位收发数据。
//! 控制帧 (WebSocket 层的 Ping / Pong) 由 `tokio-tungstenite` 自动处理，这里直接跳过。

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, error, info};
use tokio_tungstenite::{
    WebSocketStream, connect_async,
    tungstenite::{Error as TungsteniteError, protocol::Message},
};
use url::Url;

use crate::error::WsError;
use crate::message::EnginePacket;

/// 可能经过 TLS 加密的客户端 WebSocket 流。
pub type ClientWsStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// 一个活动的客户端 WebSocket 连接，发送端与接收端已拆分。
pub struct ClientConnection {
    pub ws_sender: SplitSink<ClientWsStream, Message>,
    /// 接收端设为 `pub`，调用方通常在自己的循环中配合 [`receive_packet`] 使用。
    pub ws_receiver: SplitStream<ClientWsStream>,
}

impl ClientConnection {
    /// 编码并发送一个 Engine.IO 包。
    pub async fn send_packet(&mut self, packet: &EnginePacket) -> Result<(), WsError> {
        let text = packet.encode()?;
        debug!("客户端：发送数据包: {}", text);
        self.ws_sender.send(Message::Text(text)).await?;
        Ok(())
    }

    /// 发送 WebSocket Close 帧并关闭发送端。对端已断开时返回的错误可以忽略。
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.ws_sender.close().await?;
        Ok(())
    }
}

/// 异步连接到指定的 WebSocket 服务器。
///
/// # Errors
/// URL 无法解析时返回 `WsError::InvalidUrl`；TCP 连接或握手失败时返回 `WsError::WebSocketProtocolError`。
pub async fn connect_client(url_str: String) -> Result<ClientConnection, WsError> {
    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url = Url::parse(&url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;

    match connect_async(parsed_url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("客户端：已成功连接到 {} (HTTP 状态码: {})", url_str, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection { ws_sender, ws_receiver })
        }
        Err(e) => {
            error!("客户端：连接到 {} 失败，错误: {}", url_str, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}

/// 从接收流中读取下一个 Engine.IO 包。
///
/// # Returns
/// * `Some(Ok(packet))` - 成功解析一个包。
/// * `Some(Err(e))` - 解析失败 (`PacketParse`，连接仍可用) 或底层错误 (连接已不可用)，
///   可用 [`WsError::is_connection_lost`] 区分。
/// * `None` - 连接已关闭。
pub async fn receive_packet(ws_receiver: &mut SplitStream<ClientWsStream>) -> Option<Result<EnginePacket, WsError>> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    debug!("客户端：收到原始文本消息: '{}'", text);
                    break Some(EnginePacket::parse(&text));
                }
                Message::Binary(bin) => {
                    debug!("客户端：收到二进制消息，长度: {} 字节", bin.len());
                    break Some(Err(WsError::Message("不支持二进制消息".to_string())));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(close_frame) => {
                    debug!("客户端：收到 Close 控制帧: {:?}", close_frame);
                    break None;
                }
            },
            Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) => {
                debug!("客户端：连接已关闭。");
                break None;
            }
            Some(Err(e)) => {
                error!("客户端：从 WebSocket 流接收消息时发生底层错误: {}", e);
                break Some(Err(WsError::WebSocketProtocolError(e)));
            }
            None => {
                debug!("客户端：WebSocket 接收流已结束。");
                break None;
            }
        }
    }
}
