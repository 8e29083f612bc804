// rust_websocket_utils/src/message.rs

//! Engine.IO v4 / Socket.IO v5 文本包的解析与编码。
//!
//! 每条 WebSocket 文本消息是一个 Engine.IO 包，首字符为包类型：
//!
//! | 字符 | 类型 | 说明 |
//! |---|---|---|
//! | `0` | open | 服务端握手，携带 `sid`、`pingInterval`、`pingTimeout` |
//! | `1` | close | 关闭传输 |
//! | `2` / `3` | ping / pong | 心跳，服务端发 ping，客户端回 pong |
//! | `4` | message | 内层为一个 Socket.IO 包 |
//! | `5` / `6` | upgrade / noop | 仅在长轮询升级时使用 |
//!
//! Socket.IO 包的首字符同样是类型 (`0` connect、`1` disconnect、`2` event、`4` connect_error)，
//! 之后是可选的命名空间 (`/admin,`)、可选的 ack id，最后是 JSON 数据。
//! 事件包的数据是数组 `["<事件名>", <负载>, ...]`，例如 `42["status",{"imei":"123"}]`。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::error::WsError;

/// 默认命名空间。
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO open 包中的握手参数。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// 服务端发送 ping 的间隔 (毫秒)。
    pub ping_interval: u64,
    /// 客户端回复 pong 的宽限时间 (毫秒)。
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// 为新会话生成握手参数，`sid` 为随机 UUID。
    pub fn new_session(ping_interval: u64, ping_timeout: u64) -> Self {
        Self {
            sid: Uuid::new_v4().to_string(),
            upgrades: Vec::new(),
            ping_interval,
            ping_timeout,
            max_payload: None,
        }
    }

    /// 超过该时长没有收到任何包，即可认为传输已丢失。
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// 一个 Socket.IO 事件：事件名 + 负载。
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub namespace: String,
    pub event: String,
    /// 事件数组中的第二个元素；没有负载时为 `Value::Null`。
    pub payload: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            event: event.into(),
            payload,
        }
    }
}

/// Engine.IO message 包内承载的 Socket.IO 包。
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event(EventFrame),
    ConnectError { namespace: String, data: Option<Value> },
    /// ack 与二进制包：本库不处理，只保留类型字符以便记录日志。
    Unsupported(char),
}

/// 一个 Engine.IO 文本包。
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// 客户端连接默认命名空间的请求 (`40`)。
    pub fn connect_default() -> Self {
        EnginePacket::Message(SocketPacket::Connect { namespace: DEFAULT_NAMESPACE.to_string(), data: None })
    }

    /// 默认命名空间上的事件包 (`42[...]`)。
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        EnginePacket::Message(SocketPacket::Event(EventFrame::new(event, payload)))
    }

    /// 解析一条 WebSocket 文本消息。
    ///
    /// # Errors
    /// 文本为空、包类型未知或 JSON 数据无效时返回 `WsError::PacketParse`。
    pub fn parse(text: &str) -> Result<Self, WsError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| WsError::PacketParse("空数据包".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => serde_json::from_str::<OpenHandshake>(body)
                .map(EnginePacket::Open)
                .map_err(|e| WsError::PacketParse(format!("open 包握手参数无效: {}", e))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping),
            '3' => Ok(EnginePacket::Pong),
            '4' => SocketPacket::parse(body).map(EnginePacket::Message),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(WsError::PacketParse(format!("未知的 Engine.IO 包类型 '{}'", other))),
        }
    }

    /// 编码为 WebSocket 文本消息。
    pub fn encode(&self) -> Result<String, WsError> {
        let text = match self {
            EnginePacket::Open(handshake) => {
                let json = serde_json::to_string(handshake)
                    .map_err(|e| WsError::SerializationError(format!("序列化握手参数失败: {}", e)))?;
                format!("0{}", json)
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping => "2".to_string(),
            EnginePacket::Pong => "3".to_string(),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()?),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        };
        Ok(text)
    }
}

impl SocketPacket {
    fn parse(body: &str) -> Result<Self, WsError> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| WsError::PacketParse("message 包缺少 Socket.IO 类型".to_string()))?;
        let (namespace, rest) = split_namespace(chars.as_str());

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data: parse_optional_json(rest)? }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let args = rest.trim_start_matches(|c: char| c.is_ascii_digit());
                parse_event(namespace, args).map(SocketPacket::Event)
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data: parse_optional_json(rest)? }),
            '3' | '5' | '6' => Ok(SocketPacket::Unsupported(kind)),
            other => Err(WsError::PacketParse(format!("未知的 Socket.IO 包类型 '{}'", other))),
        }
    }

    fn encode(&self) -> Result<String, WsError> {
        let text = match self {
            SocketPacket::Connect { namespace, data } => {
                format!("0{}{}", namespace_prefix(namespace), encode_optional_json(data.as_ref())?)
            }
            SocketPacket::Disconnect { namespace } => format!("1{}", namespace_prefix(namespace)),
            SocketPacket::Event(frame) => {
                let mut args = vec![Value::String(frame.event.clone())];
                if !frame.payload.is_null() {
                    args.push(frame.payload.clone());
                }
                let json = serde_json::to_string(&args)
                    .map_err(|e| WsError::SerializationError(format!("序列化事件 '{}' 失败: {}", frame.event, e)))?;
                format!("2{}{}", namespace_prefix(&frame.namespace), json)
            }
            SocketPacket::ConnectError { namespace, data } => {
                format!("4{}{}", namespace_prefix(namespace), encode_optional_json(data.as_ref())?)
            }
            SocketPacket::Unsupported(kind) => {
                return Err(WsError::SerializationError(format!("不支持编码 Socket.IO 包类型 '{}'", kind)));
            }
        };
        Ok(text)
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
        None => (rest.to_string(), ""),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

fn parse_optional_json(rest: &str) -> Result<Option<Value>, WsError> {
    if rest.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(rest)
        .map(Some)
        .map_err(|e| WsError::PacketParse(format!("Socket.IO 数据不是有效的 JSON: {}", e)))
}

fn encode_optional_json(data: Option<&Value>) -> Result<String, WsError> {
    match data {
        None => Ok(String::new()),
        Some(value) => serde_json::to_string(value)
            .map_err(|e| WsError::SerializationError(format!("序列化 Socket.IO 数据失败: {}", e))),
    }
}

fn parse_event(namespace: String, args: &str) -> Result<EventFrame, WsError> {
    let args: Vec<Value> = serde_json::from_str(args)
        .map_err(|e| WsError::PacketParse(format!("事件数据不是 JSON 数组: {}", e)))?;
    let mut args = args.into_iter();
    let event = match args.next() {
        Some(Value::String(name)) => name,
        other => {
            return Err(WsError::PacketParse(format!("事件数组首元素应为事件名，实际为: {:?}", other)));
        }
    };
    Ok(EventFrame {
        namespace,
        event,
        payload: args.next().unwrap_or(Value::Null),
    })
}
