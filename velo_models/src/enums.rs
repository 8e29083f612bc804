//! 通用枚举模块。
//!
//! 定义遥测通道上复用的消息种类。线上每个事件包都带有一个事件名
//! (`login` / `status` / `gps`)，客户端据此选择解码规则和订阅者分组。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 设备登录 (握手) 消息的线上事件名。
pub const LOGIN_EVENT: &str = "login";
/// 设备状态 / 传感器消息的线上事件名。
pub const STATUS_EVENT: &str = "status";
/// 设备定位消息的线上事件名。
pub const GPS_EVENT: &str = "gps";

/// 遥测消息的种类。
///
/// 同一台物理设备会通过同一条连接发送多种消息，`TelemetryKind` 用于区分它们。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    /// 登录 / 握手消息，携带网络描述信息。
    Login,
    /// 状态消息，携带速度、档位、电压等传感器读数。
    Status,
    /// GPS 定位消息。
    Gps,
}

impl TelemetryKind {
    /// 全部种类，按线上协议中的声明顺序排列。
    pub const ALL: [TelemetryKind; 3] = [TelemetryKind::Login, TelemetryKind::Status, TelemetryKind::Gps];

    /// 根据线上事件名查找种类；未识别的事件名返回 `None`。
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            LOGIN_EVENT => Some(TelemetryKind::Login),
            STATUS_EVENT => Some(TelemetryKind::Status),
            GPS_EVENT => Some(TelemetryKind::Gps),
            _ => None,
        }
    }

    /// 返回该种类对应的线上事件名。
    pub fn as_event_name(&self) -> &'static str {
        match self {
            TelemetryKind::Login => LOGIN_EVENT,
            TelemetryKind::Status => STATUS_EVENT,
            TelemetryKind::Gps => GPS_EVENT,
        }
    }

    /// 该种类的负载容器字段名，例如 `status` 对应 `statusData`。
    pub fn data_field(&self) -> &'static str {
        match self {
            TelemetryKind::Login => "loginData",
            TelemetryKind::Status => "statusData",
            TelemetryKind::Gps => "gpsData",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_event_name())
    }
}
