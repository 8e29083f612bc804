// rust_websocket_utils/src/server/transport.rs

//! 服务端 WebSocket 监听、接受连接和按包收发的逻辑。

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::{
    WebSocketStream, accept_async,
    tungstenite::{Error as TungsteniteError, protocol::Message},
};

use crate::error::WsError;
use crate::message::EnginePacket;

/// 经过 WebSocket 握手后的 TCP 流。
pub type WsStream = WebSocketStream<TcpStream>;

/// 已完成握手的服务端连接。
pub struct ServerConnection {
    pub peer_addr: SocketAddr,
    ws_stream: WsStream,
}

impl ServerConnection {
    pub async fn send_packet(&mut self, packet: &EnginePacket) -> Result<(), WsError> {
        let text = packet.encode()?;
        debug!("服务端：向 {} 发送数据包: {}", self.peer_addr, text);
        self.ws_stream.send(Message::Text(text)).await?;
        Ok(())
    }

    /// 直接发送一条原始文本，用于模拟格式错误的数据包。
    pub async fn send_raw_text(&mut self, text: impl Into<String>) -> Result<(), WsError> {
        self.ws_stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// 读取下一个 Engine.IO 包，语义同 [`crate::client::transport::receive_packet`]。
    pub async fn receive_packet(&mut self) -> Option<Result<EnginePacket, WsError>> {
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => break Some(EnginePacket::parse(&text)),
                Some(Ok(Message::Binary(_))) => {
                    break Some(Err(WsError::Message("不支持二进制消息".to_string())));
                }
                Some(Ok(Message::Close(_))) => break None,
                Some(Ok(_)) => {}
                Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed)) | None => break None,
                Some(Err(e)) => break Some(Err(WsError::WebSocketProtocolError(e))),
            }
        }
    }

    /// 发送 Close 帧，完成关闭握手。
    pub async fn close(mut self) -> Result<(), WsError> {
        self.ws_stream.close(None).await?;
        Ok(())
    }
}

/// 负责 WebSocket 服务端的监听和连接接受。
pub struct ServerTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ServerTransport {
    /// 绑定 TCP 监听器。传入端口 0 时由系统分配，实际地址见 [`ServerTransport::local_addr`]。
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, WsError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("WebSocket 服务器正在监听地址: {}", local_addr);
        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 持续接受连接。每个连接在独立的 Tokio 任务中完成握手，然后交给 `on_connect` 处理。
    ///
    /// 单个连接的握手失败只记录日志，不影响监听。
    pub async fn run<F, Fut>(self, on_connect: F) -> Result<(), WsError>
    where
        F: Fn(ServerConnection) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.listener.accept().await {
                Ok((tcp_stream, peer_addr)) => {
                    debug!("从 {} 接受了新的 TCP 连接", peer_addr);
                    let on_connect_callback = on_connect.clone();
                    tokio::spawn(async move {
                        match accept_async(tcp_stream).await {
                            Ok(ws_stream) => {
                                info!("与 {} 的 WebSocket 握手成功", peer_addr);
                                on_connect_callback(ServerConnection { peer_addr, ws_stream }).await;
                            }
                            Err(e) => error!("与 {} 的 WebSocket 握手失败: {}", peer_addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("接受 TCP 连接失败: {}。服务器将继续运行。", e);
                }
            }
        }
    }
}
