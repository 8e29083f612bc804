//! 设备身份与三类遥测记录的数据模型。
//!
//! 记录只通过 [`crate::codec::decode`] 构造，因此这里的类型只派生 `Serialize`
//! (用于日志和向界面层转发)，不提供绕过校验的反序列化入口。

use serde::Serialize;

use crate::enums::TelemetryKind;
use crate::error::DecodeError;

/// 线上 `imei` 字段名。
pub const IMEI_FIELD: &str = "imei";
/// 线上 `veloId` 字段名。
pub const VELO_ID_FIELD: &str = "veloId";

/// 设备身份：`(imei, veloId)` 唯一标识一台物理设备。
///
/// 两个字段都必须是非空字符串，构造后不可修改。
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity {
    imei: String,
    #[serde(rename = "veloId")]
    velo_id: String,
}

impl DeviceIdentity {
    /// 创建设备身份，任一字段为空时返回 `MalformedIdentity`。
    pub fn new(imei: impl Into<String>, velo_id: impl Into<String>) -> Result<Self, DecodeError> {
        let imei = imei.into();
        let velo_id = velo_id.into();
        if imei.is_empty() {
            return Err(DecodeError::MalformedIdentity { field: IMEI_FIELD });
        }
        if velo_id.is_empty() {
            return Err(DecodeError::MalformedIdentity { field: VELO_ID_FIELD });
        }
        Ok(Self { imei, velo_id })
    }

    pub fn imei(&self) -> &str {
        &self.imei
    }

    pub fn velo_id(&self) -> &str {
        &self.velo_id
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.imei, self.velo_id)
    }
}

/// 登录消息中的网络描述信息。本轮未上报的字段为 `None`。
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsrp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
}

/// 状态消息中的传感器读数。
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct SensorData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gear: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aku_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comp_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comp_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comp_z: Option<f64>,
}

/// 上游把登录信息合并进状态消息时附带的网络字段。
///
/// 与 [`LoginData`] 不同，合并格式中的 `mcc`、`mnc`、`cid`、`band`、`areaCode`、`op`
/// 以数值形式上报。
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergedNetworkData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsrp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_code: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
}

/// 状态负载的两种线上格式。两者互为备选，不会被合并成一个宽松的结构。
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StatusData {
    /// 仅含传感器读数的格式。
    Sensor(SensorData),
    /// 传感器读数 + 网络字段的合并格式。
    Merged {
        #[serde(flatten)]
        sensors: SensorData,
        #[serde(flatten)]
        network: MergedNetworkData,
    },
}

impl StatusData {
    /// 两种格式共有的传感器读数。
    pub fn sensors(&self) -> &SensorData {
        match self {
            StatusData::Sensor(sensors) => sensors,
            StatusData::Merged { sensors, .. } => sensors,
        }
    }

    /// 合并格式中的网络字段；纯传感器格式返回 `None`。
    pub fn network(&self) -> Option<&MergedNetworkData> {
        match self {
            StatusData::Sensor(_) => None,
            StatusData::Merged { network, .. } => Some(network),
        }
    }
}

/// 定位消息中的位置字段。
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpsData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vdop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tdop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meas_id: Option<f64>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginRecord {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub login_data: LoginData,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub status_data: StatusData,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpsRecord {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub gps_data: GpsData,
}

/// 解码后的遥测记录，按消息种类打标签。
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TelemetryRecord {
    Login(LoginRecord),
    Status(StatusRecord),
    Gps(GpsRecord),
}

impl TelemetryRecord {
    pub fn kind(&self) -> TelemetryKind {
        match self {
            TelemetryRecord::Login(_) => TelemetryKind::Login,
            TelemetryRecord::Status(_) => TelemetryKind::Status,
            TelemetryRecord::Gps(_) => TelemetryKind::Gps,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            TelemetryRecord::Login(record) => &record.identity,
            TelemetryRecord::Status(record) => &record.identity,
            TelemetryRecord::Gps(record) => &record.identity,
        }
    }
}
