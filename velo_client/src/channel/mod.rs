// velo_client/src/channel/mod.rs

//! 遥测通道：与车队遥测服务保持一条长连接，并把收到的帧解码后交给订阅者注册表。
//!
//! 状态机：
//!
//! ```text
//! Disconnected --connect()--> Connecting --握手完成--> Connected
//!                                 ^                       |
//!                                 |                   传输丢失
//!                             退避到期                     v
//!                                 +---------------- Reconnecting
//! 任意状态 --close()--> Disconnected (终止)
//! ```
//!
//! 通道只在创建它的线程上运行 (`Rc` 句柄)，`run()` 需要在 current-thread 运行时或
//! `LocalSet` 中驱动。所有挂起点 (建立连接、等待数据包、退避计时) 都与关闭信号竞争，
//! 因此 `close()` 能立即取消正在进行的连接尝试或退避等待。

pub mod backoff;

use log::{debug, error, info, warn};
use rust_websocket_utils::client::transport::{connect_client, receive_packet, ClientConnection};
use rust_websocket_utils::message::{EnginePacket, EventFrame, SocketPacket};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;
use velo_models::TelemetryKind;

use crate::error::ChannelError;
use crate::event::{ChannelEvent, DisconnectReason};
use crate::registry::SubscriberRegistry;
use backoff::{Backoff, BackoffPolicy};

/// 唯一支持的传输方式。
pub const WEBSOCKET_TRANSPORT: &str = "websocket";
/// 等待 open 包和命名空间确认的时限。
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

const ENGINE_IO_QUERY: &str = "EIO=4&transport=websocket";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "Disconnected",
            ChannelState::Connecting => "Connecting",
            ChannelState::Connected => "Connected",
            ChannelState::Reconnecting => "Reconnecting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// 服务端挂载路径，必须以 `/` 开头。
    pub path: String,
    /// 传输方式偏好列表，必须包含 `websocket`。
    pub transports: Vec<String>,
    pub reconnection: bool,
    pub backoff: BackoffPolicy,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            path: "/socket.io/".to_string(),
            transports: vec![WEBSOCKET_TRANSPORT.to_string()],
            reconnection: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// 一次会话 (从发起连接到连接结束) 的结果。
enum SessionOutcome {
    Closed,
    Lost { connected: bool, error: ChannelError },
}

struct ChannelInner {
    url: String,
    reconnection: bool,
    backoff_policy: BackoffPolicy,
    registry: SubscriberRegistry,
    state: Cell<ChannelState>,
    started: Cell<bool>,
    close_tx: watch::Sender<bool>,
}

/// 遥测通道句柄，克隆后共享同一条连接。
#[derive(Clone)]
pub struct TelemetryChannel {
    inner: Rc<ChannelInner>,
}

impl TelemetryChannel {
    /// 校验配置并创建通道，状态进入 `Connecting`。实际连接由 [`TelemetryChannel::run`] 驱动。
    ///
    /// # Errors
    /// 服务端地址或选项无效时返回 `ChannelError::Configuration`。
    pub fn connect(
        endpoint: &str,
        options: ConnectOptions,
        registry: SubscriberRegistry,
    ) -> Result<Self, ChannelError> {
        let url = build_socket_url(endpoint, &options)?;
        validate_transports(&options.transports)?;
        options.backoff.validate().map_err(ChannelError::Configuration)?;

        info!("[VeloClient] 遥测通道已创建，目标地址: {}", url);
        let (close_tx, _) = watch::channel(false);
        Ok(Self {
            inner: Rc::new(ChannelInner {
                url,
                reconnection: options.reconnection,
                backoff_policy: options.backoff,
                registry,
                state: Cell::new(ChannelState::Connecting),
                started: Cell::new(false),
                close_tx,
            }),
        })
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state.get()
    }

    /// 实际连接的 WebSocket 地址。
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.inner.registry
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.close_tx.borrow()
    }

    /// 关闭通道：进入终止状态 `Disconnected`，取消正在进行的连接或退避等待，不再重连。
    ///
    /// 可重复调用，只有第一次调用会发出 `Disconnected` 事件。
    pub fn close(&self) {
        let first = self.inner.close_tx.send_if_modified(|closed| !std::mem::replace(closed, true));
        if !first {
            return;
        }
        info!("[VeloClient] 遥测通道被显式关闭");
        self.inner.state.set(ChannelState::Disconnected);
        self.inner.registry.emit(&ChannelEvent::Disconnected { reason: DisconnectReason::Closed });
    }

    /// 驱动连接与重连循环，直到通道关闭或放弃重连。每个通道只能运行一次。
    pub async fn run(&self) {
        if self.inner.started.replace(true) {
            warn!("[VeloClient] 遥测通道已在运行，忽略重复的 run() 调用");
            return;
        }

        // 每个挂起点都与该接收端竞争
        let mut close_rx = self.inner.close_tx.subscribe();
        let mut backoff = Backoff::new(self.inner.backoff_policy.clone());
        // 连续失败次数，受 max_attempts 约束
        let mut failed_attempts: u32 = 0;
        // 自上次连接成功以来的重连序号，用于事件上报
        let mut reconnect_attempt: u32 = 0;

        while !self.is_closed() {
            self.set_state(ChannelState::Connecting);
            let (connected, error) = match self.run_session(&mut close_rx, &mut backoff).await {
                SessionOutcome::Closed => break,
                SessionOutcome::Lost { connected, error } => (connected, error),
            };
            if self.is_closed() {
                break;
            }

            // 曾经连上过：本轮失败计数从头开始
            if connected {
                failed_attempts = 0;
                reconnect_attempt = 0;
                warn!("[VeloClient] 遥测连接丢失: {}", error);
            } else {
                failed_attempts = failed_attempts.saturating_add(1);
                warn!("[VeloClient] 第 {} 次连接尝试失败: {}", failed_attempts, error);
            }

            if !self.inner.reconnection {
                self.terminate(DisconnectReason::ReconnectionDisabled);
                break;
            }
            if let Some(max_attempts) = backoff.policy().max_attempts {
                if failed_attempts >= max_attempts {
                    self.terminate(DisconnectReason::AttemptsExhausted { attempts: failed_attempts });
                    break;
                }
            }

            let delay = backoff.next_delay();
            reconnect_attempt = reconnect_attempt.saturating_add(1);
            self.set_state(ChannelState::Reconnecting);
            info!("[VeloClient] {:?} 后进行第 {} 次重连", delay, reconnect_attempt);
            self.inner.registry.emit(&ChannelEvent::Reconnecting { attempt: reconnect_attempt, delay });

            tokio::select! {
                biased;
                _ = wait_closed(&mut close_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("[VeloClient] 遥测通道运行循环结束，最终状态: {}", self.state());
    }

    /// 建立一次连接并处理数据包，直到连接丢失或通道关闭。
    async fn run_session(&self, close_rx: &mut watch::Receiver<bool>, backoff: &mut Backoff) -> SessionOutcome {
        let mut conn = tokio::select! {
            biased;
            _ = wait_closed(close_rx) => return SessionOutcome::Closed,
            result = connect_client(self.inner.url.clone()) => match result {
                Ok(conn) => conn,
                Err(e) => return SessionOutcome::Lost { connected: false, error: e.into() },
            },
        };

        // 收到 open 包之前为 None
        let mut heartbeat_timeout: Option<Duration> = None;
        let mut connected = false;

        loop {
            // 连接确认前用固定时限，之后用握手给出的心跳时限
            let wait = if connected { heartbeat_timeout.unwrap_or(CONNECT_TIMEOUT) } else { CONNECT_TIMEOUT };
            let next = tokio::select! {
                biased;
                _ = wait_closed(close_rx) => {
                    if let Err(e) = conn.close().await {
                        debug!("[VeloClient] 发送关闭帧失败: {}", e);
                    }
                    return SessionOutcome::Closed;
                }
                next = tokio::time::timeout(wait, receive_packet(&mut conn.ws_receiver)) => next,
            };

            let packet = match next {
                Err(_) => return SessionOutcome::Lost { connected, error: ChannelError::Timeout(wait) },
                Ok(None) => {
                    let error = ChannelError::Rejected("服务端关闭了连接".to_string());
                    return SessionOutcome::Lost { connected, error };
                }
                Ok(Some(Err(e))) if e.is_connection_lost() => {
                    return SessionOutcome::Lost { connected, error: e.into() };
                }
                Ok(Some(Err(e))) => {
                    warn!("[VeloClient] 丢弃无法解析的数据包: {}", e);
                    continue;
                }
                Ok(Some(Ok(packet))) => packet,
            };

            match packet {
                EnginePacket::Open(handshake) => {
                    debug!("[VeloClient] 收到握手: sid={}, 心跳超时 {:?}", handshake.sid, handshake.heartbeat_timeout());
                    heartbeat_timeout = Some(handshake.heartbeat_timeout());
                    if let Err(e) = conn.send_packet(&EnginePacket::connect_default()).await {
                        return SessionOutcome::Lost { connected, error: e.into() };
                    }
                }
                // 服务端 ping，客户端只负责回 pong
                EnginePacket::Ping => {
                    if let Err(e) = send_pong(&mut conn).await {
                        return SessionOutcome::Lost { connected, error: e };
                    }
                }
                EnginePacket::Close => {
                    let error = ChannelError::Rejected("服务端关闭了传输".to_string());
                    return SessionOutcome::Lost { connected, error };
                }
                EnginePacket::Message(SocketPacket::Connect { .. }) if !connected => {
                    if heartbeat_timeout.is_none() {
                        let error = ChannelError::Rejected("在握手之前收到了命名空间确认".to_string());
                        return SessionOutcome::Lost { connected, error };
                    }
                    connected = true;
                    backoff.reset();
                    self.set_state(ChannelState::Connected);
                    info!("[VeloClient] 遥测通道已连接: {}", self.inner.url);
                    self.inner.registry.emit(&ChannelEvent::Connected);
                }
                EnginePacket::Message(SocketPacket::Event(frame)) if connected => self.dispatch_frame(frame),
                EnginePacket::Message(SocketPacket::Disconnect { namespace }) => {
                    let error = ChannelError::Rejected(format!("服务端断开了命名空间 {}", namespace));
                    return SessionOutcome::Lost { connected, error };
                }
                EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                    let error = ChannelError::Rejected(format!("命名空间连接被拒绝: {:?}", data));
                    return SessionOutcome::Lost { connected, error };
                }
                other => debug!("[VeloClient] 忽略数据包: {:?}", other),
            }
        }
    }

    /// 解码一个事件帧并交给注册表；解码失败只丢弃该帧。
    fn dispatch_frame(&self, frame: EventFrame) {
        let Some(kind) = TelemetryKind::from_event_name(&frame.event) else {
            debug!("[VeloClient] 忽略未知事件: {}", frame.event);
            return;
        };
        match velo_models::decode(kind, &frame.payload) {
            Ok(record) => self.inner.registry.publish(record),
            Err(error) => {
                warn!("[VeloClient] {} 帧解码失败，已丢弃: {}", kind, error);
                self.inner.registry.emit(&ChannelEvent::DecodeFailed { kind, error });
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        // close() 之后状态固定为 Disconnected
        if self.is_closed() && state != ChannelState::Disconnected {
            return;
        }
        let previous = self.inner.state.replace(state);
        if previous != state {
            debug!("[VeloClient] 通道状态: {} -> {}", previous, state);
        }
    }

    fn terminate(&self, reason: DisconnectReason) {
        error!("[VeloClient] 遥测通道终止: {}", reason);
        self.set_state(ChannelState::Disconnected);
        self.inner.registry.emit(&ChannelEvent::Disconnected { reason });
    }
}

async fn send_pong(conn: &mut ClientConnection) -> Result<(), ChannelError> {
    conn.send_packet(&EnginePacket::Pong).await?;
    Ok(())
}

/// 等待关闭信号。发送端随通道一起存活，因此不会出现通道已关闭但信号未送达的情况。
async fn wait_closed(close_rx: &mut watch::Receiver<bool>) {
    if close_rx.wait_for(|closed| *closed).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// 校验服务端地址和路径，生成 `ws(s)://host[:port]{path}?EIO=4&transport=websocket`。
fn build_socket_url(endpoint: &str, options: &ConnectOptions) -> Result<String, ChannelError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ChannelError::Configuration(format!("无效的服务端地址 '{}': {}", endpoint, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::Configuration(format!("不支持的协议 '{}'，仅支持 http/https/ws/wss", other)));
        }
    };
    if url.host_str().is_none() {
        return Err(ChannelError::Configuration(format!("服务端地址 '{}' 缺少主机名", endpoint)));
    }
    if !options.path.starts_with('/') {
        return Err(ChannelError::Configuration(format!("路径 '{}' 必须以 '/' 开头", options.path)));
    }
    if url.path() != "/" {
        warn!("[VeloClient] 服务端地址中的路径 '{}' 被忽略，使用配置的路径 '{}'", url.path(), options.path);
    }

    // http(s) 映射为 ws(s)，路径和查询串整体替换
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::Configuration(format!("无法把 '{}' 转换为 {} 地址", endpoint, scheme)))?;
    url.set_path(&options.path);
    url.set_query(Some(ENGINE_IO_QUERY));
    url.set_fragment(None);
    Ok(url.to_string())
}

fn validate_transports(transports: &[String]) -> Result<(), ChannelError> {
    if transports.is_empty() {
        return Err(ChannelError::Configuration("传输方式列表不能为空".to_string()));
    }
    if !transports.iter().any(|t| t == WEBSOCKET_TRANSPORT) {
        return Err(ChannelError::Configuration(format!(
            "传输方式列表 {:?} 必须包含 {}",
            transports, WEBSOCKET_TRANSPORT
        )));
    }
    for transport in transports.iter().filter(|t| t.as_str() != WEBSOCKET_TRANSPORT) {
        warn!("[VeloClient] 不支持的传输方式 '{}' 将被忽略", transport);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn options_with_path(path: &str) -> ConnectOptions {
        ConnectOptions { path: path.to_string(), ..ConnectOptions::default() }
    }

    #[test]
    fn test_socket_url_maps_scheme_and_path() {
        let url = build_socket_url("http://fleet.example.com:3000", &ConnectOptions::default()).expect("合法地址");
        assert_eq!(url, "ws://fleet.example.com:3000/socket.io/?EIO=4&transport=websocket");

        let url = build_socket_url("https://fleet.example.com", &options_with_path("/telemetry/")).expect("合法地址");
        assert_eq!(url, "wss://fleet.example.com/telemetry/?EIO=4&transport=websocket");

        let url = build_socket_url("ws://127.0.0.1:8080", &ConnectOptions::default()).expect("合法地址");
        assert_eq!(url, "ws://127.0.0.1:8080/socket.io/?EIO=4&transport=websocket");
    }

    #[test]
    fn test_invalid_configuration_is_fatal_at_connect() {
        let cases: Vec<(&str, ConnectOptions)> = vec![
            ("not a url", ConnectOptions::default()),
            ("ftp://fleet.example.com", ConnectOptions::default()),
            ("http://fleet.example.com", options_with_path("socket.io/")),
            ("http://fleet.example.com", ConnectOptions { transports: vec![], ..ConnectOptions::default() }),
            (
                "http://fleet.example.com",
                ConnectOptions { transports: vec!["polling".to_string()], ..ConnectOptions::default() },
            ),
            (
                "http://fleet.example.com",
                ConnectOptions {
                    backoff: BackoffPolicy { factor: 0.1, ..BackoffPolicy::default() },
                    ..ConnectOptions::default()
                },
            ),
        ];
        for (endpoint, options) in cases {
            let result = TelemetryChannel::connect(endpoint, options.clone(), SubscriberRegistry::new());
            assert!(
                matches!(result, Err(ChannelError::Configuration(_))),
                "地址 {} / 选项 {:?} 应返回配置错误",
                endpoint,
                options
            );
        }
    }

    #[test]
    fn test_connect_enters_connecting_and_polling_is_ignored() {
        let options = ConnectOptions {
            transports: vec!["polling".to_string(), "websocket".to_string()],
            ..ConnectOptions::default()
        };
        let channel = TelemetryChannel::connect("http://fleet.example.com", options, SubscriberRegistry::new())
            .expect("包含 websocket 的传输列表应被接受");
        assert_eq!(channel.state(), ChannelState::Connecting);
        assert!(channel.url().starts_with("ws://"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        registry.on_channel_event(move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });

        let channel = TelemetryChannel::connect("http://127.0.0.1:1", ConnectOptions::default(), registry)
            .expect("合法配置");
        channel.close();
        channel.close();

        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(channel.is_closed());
        assert_eq!(
            *events.borrow(),
            vec![ChannelEvent::Disconnected { reason: DisconnectReason::Closed }],
            "重复 close() 只应发出一次 Disconnected 事件"
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_run_after_close_returns_immediately() {
        let channel = TelemetryChannel::connect("http://127.0.0.1:1", ConnectOptions::default(), SubscriberRegistry::new())
            .expect("合法配置");
        channel.close();
        tokio::time::timeout(Duration::from_secs(1), channel.run())
            .await
            .expect("关闭后的 run() 应立即返回");
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }
}
