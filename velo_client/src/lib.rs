//! `velo_client` Velo 车队遥测客户端核心逻辑。
//!
//! - `credential`: 从 cookie 风格的键值串读取会话凭证 (`Velo.JWT`)。
//! - `router`: 路由表与导航守卫，按凭证决定放行或重定向。
//! - `channel`: 遥测长连接，负责握手、心跳、退避重连和帧分发。
//! - `registry`: 订阅者注册表，按种类和设备分发解码后的记录。
//! - `config` / `event` / `error`: 配置、通道事件与错误类型。
//!
//! 通道在启动时显式创建一次，并作为参数传给需要它的组件，不存在全局单例。

pub mod channel;
pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod registry;
pub mod router;

pub use channel::{ChannelState, ConnectOptions, TelemetryChannel};
pub use credential::{CookieFile, CookieSource, CredentialStore, StaticCookies};
pub use error::ChannelError;
pub use event::{ChannelEvent, DisconnectReason};
pub use registry::{LatestRecord, SubscriberRegistry, SubscriptionId};
pub use router::{Decision, NavigationGuard, Route, RouteMeta, RouteTable, RouteTableError};
